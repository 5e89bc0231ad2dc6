//! Run-time task status, observable while a run is in flight.

use ordo_intern::Symbol;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Where a task currently stands within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting on dependencies or a worker slot.
    Pending,
    /// Currently executing.
    Running,
    /// Executed and succeeded.
    Succeeded,
    /// Satisfied from cache; nothing executed.
    Cached,
    /// Executed and failed.
    Failed,
}

/// Shared status map: written by the scheduler coordinator, read by
/// observers (the CLI, a future UI) through a read lock.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<HashMap<Symbol, TaskStatus>>>,
}

impl StatusBoard {
    pub(crate) fn set(&self, task: Symbol, status: TaskStatus) {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(task, status);
    }

    /// The current status of a task, if the run has touched it.
    #[must_use]
    pub fn get(&self, task: Symbol) -> Option<TaskStatus> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&task)
            .copied()
    }

    /// Snapshot of every task's status.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<Symbol, TaskStatus> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordo_intern::intern;

    #[test]
    fn set_then_get_roundtrips() {
        let board = StatusBoard::default();
        let name = intern("status-board-task");
        assert!(board.get(name).is_none());

        board.set(name, TaskStatus::Running);
        assert_eq!(board.get(name), Some(TaskStatus::Running));

        board.set(name, TaskStatus::Succeeded);
        assert_eq!(board.snapshot()[&name], TaskStatus::Succeeded);
    }
}
