//! Console tracer: renders scheduler events through `tracing`.
//!
//! Going through the subscriber keeps task output subject to the same
//! `--log-format` switch as everything else, so `json` mode emits one
//! object per line for machine consumers.

use ordo_scheduler::{BuildPlan, TaskSpan, Tracer};
use tracing::{debug, error, info, warn};

/// Tracer for interactive CLI runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleTracer;

impl Tracer for ConsoleTracer {
    fn plan(&self, plan: &BuildPlan) {
        info!(
            targets = ?plan.targets,
            tasks = plan.tasks.len(),
            "build plan ready"
        );
        debug!(order = ?plan.tasks, "execution order");
    }

    fn task_span(&self, task: &str) -> Box<dyn TaskSpan> {
        debug!(task, "task started");
        Box::new(ConsoleSpan {
            task: task.to_string(),
        })
    }
}

struct ConsoleSpan {
    task: String,
}

impl TaskSpan for ConsoleSpan {
    fn stdout(&self, chunk: &str) {
        info!(task = %self.task, "{chunk}");
    }

    fn stderr(&self, chunk: &str) {
        warn!(task = %self.task, "{chunk}");
    }

    fn mark_cached(&self) {
        info!(task = %self.task, "cached");
    }

    fn fail(&self, message: &str) {
        error!(task = %self.task, "{message}");
    }

    fn finish(&self) {
        debug!(task = %self.task, "task finished");
    }
}
