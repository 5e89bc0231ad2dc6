//! Subcommand implementations.

mod list;
mod plan;
mod run;

pub use list::list;
pub use plan::plan;
pub use run::run;

use miette::Diagnostic;
use ordo_config::find_root;
use ordo_graph::TaskGraph;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to the user, with their exit codes.
#[derive(Error, Debug, Diagnostic)]
pub enum AppError {
    /// Configuration discovery or loading failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ordo_config::Error),

    /// The run itself failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Run(#[from] ordo_scheduler::Error),

    /// Local state could not be opened.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] ordo_store::Error),

    /// The package index client could not be constructed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolver(#[from] ordo_resolver::Error),

    /// The plan could not be rendered as JSON.
    #[error("failed to encode the build plan")]
    #[diagnostic(code(ordo::cli::plan_encode))]
    PlanEncode(#[source] serde_json::Error),
}

impl AppError {
    /// Process exit code for this error: 2 for configuration problems,
    /// 1 for everything else.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Locate the workspace root and load its graph.
fn load_workspace(directory: Option<&PathBuf>) -> Result<TaskGraph, AppError> {
    let start = match directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(|source| ordo_config::Error::ConfigRead {
            path: PathBuf::from("."),
            source,
        })?,
    };
    let root = find_root(&start)?;
    Ok(ordo_config::load(&root)?)
}
