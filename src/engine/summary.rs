// src/engine/summary.rs

use super::{TaskName, TaskOutcome};

/// Latest known outcome of every task that ran (or was blocked) while the
/// runtime was alive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: Vec<TaskName>,
    pub failed: Vec<TaskName>,
    /// Not executed because a dependency failed.
    pub blocked: Vec<TaskName>,
}

impl RunSummary {
    /// True when nothing failed and nothing was blocked.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }

    /// Failed and blocked tasks together, failed first.
    pub fn unsuccessful(&self) -> Vec<TaskName> {
        self.failed
            .iter()
            .chain(self.blocked.iter())
            .cloned()
            .collect()
    }

    pub(crate) fn record(&mut self, task: &str, outcome: TaskOutcome) {
        self.forget(task);
        match outcome {
            TaskOutcome::Success => self.succeeded.push(task.to_string()),
            TaskOutcome::Failed => self.failed.push(task.to_string()),
        }
    }

    pub(crate) fn record_blocked(&mut self, task: &str) {
        self.forget(task);
        self.blocked.push(task.to_string());
    }

    fn forget(&mut self, task: &str) {
        self.succeeded.retain(|t| t != task);
        self.failed.retain(|t| t != task);
        self.blocked.retain(|t| t != task);
    }
}
