// src/exec/backend.rs

//! Where ready tasks go. The runtime only sees [`ExecutorBackend`];
//! [`ActionExecutor`] runs registered [`TaskAction`]s and tests plug in an
//! executor that completes tasks without running anything.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskName, TaskOutcome};
use crate::errors::{Error, Result};
use crate::registry::TaskAction;

use super::task_runner::run_task;

pub trait ExecutorBackend: Send {
    /// Start `tasks` without waiting for them. Each one later reports back
    /// with `RuntimeEvent::TaskCompleted`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Runs each task's action on the blocking pool.
pub struct ActionExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    actions: Arc<HashMap<TaskName, Arc<dyn TaskAction>>>,
}

impl ActionExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        actions: HashMap<TaskName, Arc<dyn TaskAction>>,
    ) -> Self {
        Self {
            runtime_tx,
            actions: Arc::new(actions),
        }
    }
}

impl ExecutorBackend for ActionExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let actions = Arc::clone(&self.actions);

        Box::pin(async move {
            for task in tasks {
                match actions.get(&task.name) {
                    Some(action) => {
                        tokio::spawn(run_task(task, Arc::clone(action), tx.clone()));
                    }
                    None => {
                        warn!(task = %task.name, "no action registered for task; failing it");
                        tx.send(RuntimeEvent::TaskCompleted {
                            task: task.name,
                            outcome: TaskOutcome::Failed,
                        })
                        .await
                        .map_err(Error::from)?;
                    }
                }
            }
            Ok(())
        })
    }
}
