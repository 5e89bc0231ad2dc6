//! Error types for graph construction and validation.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or validating a task graph.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum Error {
    /// Two tasks were registered under the same name.
    #[error("duplicate task `{task_name}`")]
    #[diagnostic(
        code(ordo::graph::duplicate_task),
        help("task names must be unique across the workspace")
    )]
    DuplicateTask {
        /// The name that was registered twice.
        task_name: String,
    },

    /// A task was looked up that is not part of the graph.
    #[error("task `{task_name}` not found")]
    #[diagnostic(code(ordo::graph::task_not_found))]
    TaskNotFound {
        /// The unknown task name.
        task_name: String,
    },

    /// A task name is structurally invalid.
    #[error("invalid task name `{task_name}`: {reason}")]
    #[diagnostic(code(ordo::graph::invalid_task_name))]
    InvalidTaskName {
        /// The offending name.
        task_name: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// A task used a name reserved by the runner.
    #[error("task name `{task_name}` is reserved")]
    #[diagnostic(
        code(ordo::graph::reserved_task_name),
        help("`all` is the pseudo-target that expands to every task")
    )]
    ReservedTaskName {
        /// The reserved name.
        task_name: String,
    },

    /// A task depends on a task that does not exist.
    #[error("task `{task}` depends on missing task `{missing_dependency}`")]
    #[diagnostic(code(ordo::graph::missing_dependency))]
    MissingDependency {
        /// The task holding the dangling reference.
        task: String,
        /// The name the reference points at.
        missing_dependency: String,
    },

    /// The dependency relation contains a cycle.
    #[error("dependency cycle among tasks: {}", remaining.join(", "))]
    #[diagnostic(
        code(ordo::graph::cycle),
        help("break the cycle by removing one of the listed dependencies")
    )]
    Cycle {
        /// Tasks that could not be ordered, sorted by name.
        remaining: Vec<String>,
    },

    /// A tool specification string could not be parsed.
    #[error("invalid tool spec `{spec}`: expected `package@version`")]
    #[diagnostic(code(ordo::graph::invalid_tool_spec))]
    InvalidToolSpec {
        /// The unparsable spec string.
        spec: String,
    },

    /// An operation required a validated graph.
    #[error("graph has not been validated")]
    #[diagnostic(
        code(ordo::graph::not_validated),
        help("call validate() before walking or querying dependents")
    )]
    NotValidated,

    /// A mutation was attempted after successful validation.
    #[error("graph is frozen after validation")]
    #[diagnostic(code(ordo::graph::frozen))]
    Frozen,
}
