//! Capability traits the scheduler depends on.
//!
//! The scheduler never talks to the OS, the terminal, or the network
//! directly; it drives these ports. Production implementations live in
//! sibling crates (`ordo-process`, `ordo-store`, `ordo-envs`) and in the
//! CLI binary; tests substitute fakes.

use crate::plan::BuildPlan;
use async_trait::async_trait;
use miette::Diagnostic;
use ordo_graph::{Task, ToolSpec};
use ordo_store::BuildInfo;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure modes of the executor port.
#[derive(Error, Debug, Diagnostic)]
pub enum ExecutionError {
    /// The child process exited with a non-zero status.
    #[error("command `{command}` exited with code {exit_code}")]
    #[diagnostic(code(ordo::exec::exit_status))]
    ExitStatus {
        /// The command that ran (argv[0]).
        command: String,
        /// The child's exit code.
        exit_code: i32,
    },

    /// The child process was terminated by a signal.
    #[error("command `{command}` was terminated by a signal")]
    #[diagnostic(code(ordo::exec::signalled))]
    Signalled {
        /// The command that ran (argv[0]).
        command: String,
    },

    /// The child process could not be started.
    #[error("failed to spawn `{command}`")]
    #[diagnostic(
        code(ordo::exec::spawn),
        help("is the command on the hydrated environment's PATH?")
    )]
    Spawn {
        /// The command that failed to start.
        command: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Streaming the child's output failed.
    #[error("task I/O failed")]
    #[diagnostic(code(ordo::exec::io))]
    Io {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ExecutionError {
    /// The child's exit code, where one exists.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExitStatus { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Runs a task's command in a child process.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Spawn `task.command` with `cwd` as working directory and `env` as
    /// the child's entire environment. Output streams to the span; `cancel`
    /// must terminate the child.
    async fn execute(
        &self,
        task: &Task,
        cwd: &Path,
        env: &[String],
        span: &dyn TaskSpan,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ExecutionError>;
}

/// Per-task observation surface: streamed output plus lifecycle marks.
///
/// Writers are append-only; chunks arrive in the order the child produced
/// them within each stream.
pub trait TaskSpan: Send + Sync {
    /// A chunk of the child's standard output.
    fn stdout(&self, chunk: &str);

    /// A chunk of the child's standard error.
    fn stderr(&self, chunk: &str);

    /// The task was satisfied from cache; no execution happened.
    fn mark_cached(&self) {}

    /// The task failed with this rendered error.
    fn fail(&self, _message: &str) {}

    /// The task is done (any outcome); the span closes.
    fn finish(&self) {}
}

/// Receives the build plan and opens per-task spans.
pub trait Tracer: Send + Sync {
    /// The ordered execution plan, before any task starts.
    fn plan(&self, _plan: &BuildPlan) {}

    /// Open a span for the named task.
    fn task_span(&self, task: &str) -> Box<dyn TaskSpan>;
}

/// Persistent fingerprint store the scheduler checks and updates.
pub trait BuildInfoStore: Send + Sync {
    /// Fetch the record for a task, if any.
    fn get(&self, task_name: &str) -> ordo_store::Result<Option<BuildInfo>>;

    /// Persist a record, replacing any previous one.
    fn put(&self, record: &BuildInfo) -> ordo_store::Result<()>;

    /// Drop a task's record.
    fn delete(&self, task_name: &str) -> ordo_store::Result<()>;
}

impl BuildInfoStore for ordo_store::Store {
    fn get(&self, task_name: &str) -> ordo_store::Result<Option<BuildInfo>> {
        Self::get(self, task_name)
    }

    fn put(&self, record: &BuildInfo) -> ordo_store::Result<()> {
        Self::put(self, record)
    }

    fn delete(&self, task_name: &str) -> ordo_store::Result<()> {
        Self::delete(self, task_name)
    }
}

/// Hydrates hermetic environments for tool sets.
#[async_trait]
pub trait EnvironmentSource: Send + Sync {
    /// Produce the sorted `KEY=VALUE` environment for a tool set.
    async fn get_environment(
        &self,
        tools: &BTreeMap<String, ToolSpec>,
    ) -> ordo_envs::Result<Arc<Vec<String>>>;
}

#[async_trait]
impl EnvironmentSource for ordo_envs::EnvironmentFactory {
    async fn get_environment(
        &self,
        tools: &BTreeMap<String, ToolSpec>,
    ) -> ordo_envs::Result<Arc<Vec<String>>> {
        Self::get_environment(self, tools).await
    }
}
