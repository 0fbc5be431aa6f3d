//! Executor that runs nothing and reports outcomes straight away.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use assetdag::dag::ScheduledTask;
use assetdag::engine::{RuntimeEvent, TaskOutcome};
use assetdag::errors::Result;
use assetdag::exec::ExecutorBackend;

/// Appends every dispatched task name to a shared log and completes it,
/// failing the names passed to [`FakeExecutor::failing`].
pub struct FakeExecutor {
    events: mpsc::Sender<RuntimeEvent>,
    log: Arc<Mutex<Vec<String>>>,
    failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(events: mpsc::Sender<RuntimeEvent>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            events,
            log,
            failing: HashSet::new(),
        }
    }

    pub fn failing<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing.extend(tasks.into_iter().map(Into::into));
        self
    }

    fn outcome_for(&self, task: &str) -> TaskOutcome {
        if self.failing.contains(task) {
            TaskOutcome::Failed
        } else {
            TaskOutcome::Success
        }
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let completions: Vec<RuntimeEvent> = tasks
            .into_iter()
            .map(|t| RuntimeEvent::TaskCompleted {
                outcome: self.outcome_for(&t.name),
                task: t.name,
            })
            .collect();

        Box::pin(async move {
            for event in completions {
                if let RuntimeEvent::TaskCompleted { task, .. } = &event {
                    self.log.lock().unwrap().push(task.clone());
                }
                self.events.send(event).await.map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
