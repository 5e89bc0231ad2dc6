//! Error types for scheduling and per-task execution.

use crate::ports::ExecutionError;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the scheduler or joined from per-task failures.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Graph validation or lookup failure.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] ordo_graph::Error),

    /// Input pattern expansion failure.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Inputs(#[from] ordo_inputs::Error),

    /// Fingerprint computation failure.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Hash(#[from] ordo_hash::Error),

    /// Build-info store failure.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] ordo_store::Error),

    /// Environment hydration failure.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Environment(#[from] ordo_envs::Error),

    /// The executor reported a failure.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Execution(#[from] ExecutionError),

    /// A declared output path escapes the workspace root.
    #[error("task `{task}` declares output `{path}` outside the workspace root")]
    #[diagnostic(
        code(ordo::scheduler::output_outside_root),
        help("output paths must stay within the workspace after normalisation")
    )]
    OutputOutsideRoot {
        /// The task declaring the output.
        task: String,
        /// The declared output path.
        path: String,
    },

    /// Removing a stale output failed.
    #[error("failed to clean output `{path}`")]
    #[diagnostic(code(ordo::scheduler::output_clean))]
    OutputClean {
        /// The output being removed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A task needed an environment that phase 1 never hydrated.
    #[error("no hydrated environment `{env_id}` for task `{task}`")]
    #[diagnostic(
        code(ordo::scheduler::environment_not_cached),
        help("this is a scheduler bug: hydration must cover every tool set in the closure")
    )]
    EnvironmentNotCached {
        /// The task requesting the environment.
        task: String,
        /// The missing environment identifier.
        env_id: String,
    },

    /// A failure scoped to one task, wrapping its cause.
    #[error("task `{task}` failed")]
    #[diagnostic(code(ordo::scheduler::task_failed))]
    Task {
        /// The failing task's name.
        task: String,
        /// What went wrong.
        #[source]
        source: Box<Error>,
    },

    /// The run was cancelled before completion.
    #[error("run cancelled")]
    #[diagnostic(code(ordo::scheduler::cancelled))]
    Cancelled,

    /// Several failures accumulated during one run.
    #[error("{} failure(s) during the run", errors.len())]
    #[diagnostic(code(ordo::scheduler::joined))]
    Joined {
        /// The individual failures, in completion order.
        #[related]
        errors: Vec<Error>,
    },
}

impl Error {
    /// Scope an error to a task.
    #[must_use]
    pub fn for_task(task: &str, source: Self) -> Self {
        Self::Task {
            task: task.to_string(),
            source: Box::new(source),
        }
    }

    /// Join accumulated errors into a single error, if any.
    pub fn join(mut errors: Vec<Self>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Joined { errors }),
        }
    }
}
