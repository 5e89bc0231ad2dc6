//! OS process executor.
//!
//! Implements the scheduler's executor port by spawning the task's command
//! as a child process: `working_dir` as CWD, the provided entries as the
//! child's entire environment (nothing inherited), and both output streams
//! forwarded line-wise to the task span. Cancellation kills the child and
//! reaps it before returning.

use async_trait::async_trait;
use ordo_graph::Task;
use ordo_scheduler::{ExecutionError, Executor, TaskSpan};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Executor backed by [`tokio::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Create a process executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(
        &self,
        task: &Task,
        cwd: &Path,
        env: &[String],
        span: &dyn TaskSpan,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        let Some((program, args)) = task.command.split_first() else {
            return Ok(());
        };
        debug!(task = %task.name, %program, cwd = %cwd.display(), "spawning task command");

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .env_clear()
            .envs(env.iter().filter_map(|entry| entry.split_once('=')))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                command: program.clone(),
                source,
            })?;

        let mut stdout = child
            .stdout
            .take()
            .map(|pipe| BufReader::new(pipe).lines());
        let mut stderr = child
            .stderr
            .take()
            .map(|pipe| BufReader::new(pipe).lines());

        let mut killed = false;
        loop {
            tokio::select! {
                line = next_line(&mut stdout), if stdout.is_some() => {
                    match line? {
                        Some(line) => span.stdout(&line),
                        None => stdout = None,
                    }
                }
                line = next_line(&mut stderr), if stderr.is_some() => {
                    match line? {
                        Some(line) => span.stderr(&line),
                        None => stderr = None,
                    }
                }
                () = cancel.cancelled(), if !killed => {
                    debug!(task = %task.name, "cancelling child process");
                    let _ = child.start_kill();
                    killed = true;
                }
            }
            if stdout.is_none() && stderr.is_none() {
                break;
            }
        }

        let status = tokio::select! {
            status = child.wait() => {
                status.map_err(|source| ExecutionError::Io { source })?
            }
            () = cancel.cancelled(), if !killed => {
                let _ = child.start_kill();
                child
                    .wait()
                    .await
                    .map_err(|source| ExecutionError::Io { source })?
            }
        };

        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(exit_code) => Err(ExecutionError::ExitStatus {
                command: program.clone(),
                exit_code,
            }),
            None => Err(ExecutionError::Signalled {
                command: program.clone(),
            }),
        }
    }
}

type Lines<R> = tokio::io::Lines<BufReader<R>>;

async fn next_line<R: tokio::io::AsyncRead + Unpin>(
    lines: &mut Option<Lines<R>>,
) -> Result<Option<String>, ExecutionError> {
    match lines {
        Some(lines) => lines
            .next_line()
            .await
            .map_err(|source| ExecutionError::Io { source }),
        None => Ok(None),
    }
}
