//! Error types for configuration loading.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading workspace configuration.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// No configuration file exists at the expected location.
    #[error("no configuration found at `{path}`")]
    #[diagnostic(
        code(ordo::config::not_found),
        help("create an `ordo.yaml` at the workspace root")
    )]
    ConfigNotFound {
        /// Where the loader looked.
        path: PathBuf,
    },

    /// The configuration file could not be read.
    #[error("failed to read configuration at `{path}`")]
    #[diagnostic(code(ordo::config::read))]
    ConfigRead {
        /// The unreadable file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for the expected schema.
    #[error("failed to parse configuration at `{path}`")]
    #[diagnostic(code(ordo::config::parse))]
    ConfigParse {
        /// The offending file.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A project directory name cannot be used as a namespace.
    #[error("invalid project name `{name}`")]
    #[diagnostic(
        code(ordo::config::invalid_project_name),
        help("project directory names may contain letters, digits, `_`, `.` and `-`")
    )]
    InvalidProjectName {
        /// The rejected name.
        name: String,
    },

    /// Two project entries resolve to the same namespace.
    #[error("duplicate project name `{name}`")]
    #[diagnostic(code(ordo::config::duplicate_project_name))]
    DuplicateProjectName {
        /// The colliding name.
        name: String,
    },

    /// A task references a tool alias absent from the catalog.
    #[error("task `{task}` references undeclared tool `{alias}`")]
    #[diagnostic(
        code(ordo::config::missing_tool),
        help("declare the alias under `tools:` in the workspace or project file")
    )]
    MissingTool {
        /// The task holding the reference.
        task: String,
        /// The undeclared alias.
        alias: String,
    },

    /// Graph construction or validation rejected the loaded tasks.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] ordo_graph::Error),
}
