// src/dag/task_state.rs

use crate::engine::TaskName;

/// Where a task stands in the active run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Part of the run, waiting on dependencies.
    Waiting,
    /// Handed to the executor.
    Running,
    Succeeded,
    Failed,
    /// Will not run in this run because a dependency failed or was blocked.
    Blocked,
}

impl RunState {
    /// No further transition happens in this run.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Blocked)
    }

    /// Dependents of this task cannot run in this run.
    pub fn stops_dependents(self) -> bool {
        matches!(self, Self::Failed | Self::Blocked)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TaskSlot {
    pub deps: Vec<TaskName>,
    /// `None` while the task is not part of the active run.
    pub state: Option<RunState>,
    /// Number of runs this task has been started in.
    pub starts: u64,
}

/// A task handed to the executor, tagged with the run it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub run_id: u64,
}
