// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, RunSummary, RuntimeEvent, TaskName};

/// Async shell around [`CoreRuntime`]: reads events, applies the commands
/// the core returns and hands ready tasks to `E`.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    events: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    initial: Vec<TaskName>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, events: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            events,
            executor,
            initial: Vec::new(),
        }
    }

    /// Targets that share the first run, started before any event is read.
    pub fn with_initial_targets(mut self, targets: Vec<TaskName>) -> Self {
        self.initial = targets;
        self
    }

    /// Run until the core asks to stop or every sender is gone.
    pub async fn run(mut self) -> Result<RunSummary> {
        let initial = std::mem::take(&mut self.initial);
        info!(targets = ?initial, "runtime started");

        let mut keep_running = true;
        if !initial.is_empty() {
            let step = self.core.start(initial);
            keep_running = self.apply(step).await?;
        }

        while keep_running {
            let Some(event) = self.events.recv().await else {
                debug!("event channel closed");
                break;
            };
            debug!(?event, "event");
            let step = self.core.step(event);
            keep_running = self.apply(step).await?;
        }

        let summary = self.core.into_summary();
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            blocked = summary.blocked.len(),
            "runtime stopped"
        );
        Ok(summary)
    }

    async fn apply(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            match command {
                CoreCommand::DispatchTasks(tasks) if !tasks.is_empty() => {
                    debug!(
                        tasks = ?tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                        "dispatching"
                    );
                    self.executor.spawn_ready_tasks(tasks).await?;
                }
                CoreCommand::DispatchTasks(_) => {}
                CoreCommand::RequestExit => debug!("core requested exit"),
            }
        }
        Ok(step.keep_running)
    }
}
