// src/engine/core.rs

//! Synchronous half of the engine.
//!
//! [`CoreRuntime`] turns one [`RuntimeEvent`] at a time into a [`CoreStep`]
//! of commands for the async shell. It owns no channels and does no IO, so
//! property tests drive it directly.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    CoreStep, finish_if_idle, handle_task_completion, handle_task_trigger,
    start_new_run_from_triggers,
};
use crate::engine::queue::TriggerQueue;
use crate::engine::{RunSummary, RuntimeEvent, RuntimeOptions, TaskName};
use crate::types::TriggerWhileRunningBehaviour;

/// Scheduler, trigger queue and the outcomes seen so far.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    queue: TriggerQueue,
    options: RuntimeOptions,
    summary: RunSummary,
}

impl CoreRuntime {
    pub fn new(
        scheduler: Scheduler,
        behaviour: TriggerWhileRunningBehaviour,
        queue_length: usize,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            scheduler,
            queue: TriggerQueue::new(behaviour, queue_length),
            options,
            summary: RunSummary::default(),
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn into_summary(self) -> RunSummary {
        self.summary
    }

    /// Open one run covering every target. Shared dependencies run once.
    pub fn start(&mut self, targets: Vec<TaskName>) -> CoreStep {
        let mut step = start_new_run_from_triggers(&mut self.scheduler, targets);
        finish_if_idle(&self.scheduler, &self.queue, &self.options, &mut step);
        self.note_blocked(&step);
        step
    }

    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let step = match event {
            RuntimeEvent::TaskTriggered { task, reason } => handle_task_trigger(
                &mut self.scheduler,
                &mut self.queue,
                &self.options,
                task,
                reason,
            ),
            RuntimeEvent::TaskCompleted { task, outcome } => {
                self.summary.record(&task, outcome);
                handle_task_completion(
                    &mut self.scheduler,
                    &mut self.queue,
                    &self.options,
                    task,
                    outcome,
                )
            }
            RuntimeEvent::ShutdownRequested => CoreStep::default(),
        };
        self.note_blocked(&step);
        step
    }

    fn note_blocked(&mut self, step: &CoreStep) {
        for task in step.blocked.iter() {
            self.summary.record_blocked(task);
        }
    }
}
