// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::BTreeSet;

use tracing::debug;

use crate::dag::{RunState, ScheduledTask, Scheduler};
use crate::engine::queue::TriggerQueue;
use crate::engine::{RuntimeOptions, TaskName, TriggerReason};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Request that the runtime exits (one-shot commands, once idle).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Tasks that will not run in this run because a dependency failed.
    pub blocked: Vec<TaskName>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn running() -> Self {
        Self {
            keep_running: true,
            ..Self::default()
        }
    }

    fn dispatch(&mut self, tasks: Vec<ScheduledTask>) {
        if !tasks.is_empty() {
            self.commands.push(CoreCommand::DispatchTasks(tasks));
        }
    }

    fn absorb(&mut self, other: CoreStep) {
        self.commands.extend(other.commands);
        self.blocked.extend(other.blocked);
    }
}

/// Handle a task trigger event.
///
/// - If the scheduler is idle, start a new run seeded with this trigger plus
///   anything that was already queued.
/// - If a run is active:
///   - a task not yet in the run is merged into it immediately, so unrelated
///     tasks share the run and execute concurrently;
///   - a task still `Waiting` will read its sources when it starts, so the
///     trigger is already covered;
///   - a task that is running or finished is queued for a future run.
pub fn handle_task_trigger(
    scheduler: &mut Scheduler,
    queue: &mut TriggerQueue,
    options: &RuntimeOptions,
    task: TaskName,
    reason: TriggerReason,
) -> CoreStep {
    debug!(task = %task, ?reason, "handling trigger");

    if scheduler.is_idle() {
        let mut triggers = queue.drain_pending();
        if !triggers.contains(&task) {
            triggers.push(task);
        }
        let mut step = start_new_run_from_triggers(scheduler, triggers);
        finish_if_idle(scheduler, queue, options, &mut step);
        return step;
    }

    let mut step = CoreStep::running();

    if !scheduler.contains(&task) {
        debug!(task = %task, "trigger for unknown task; ignoring");
    } else {
        match scheduler.state_of(&task) {
            None => {
                let inner = scheduler.trigger(&task);
                step.dispatch(inner.ready);
                step.blocked.extend(inner.blocked);
            }
            Some(RunState::Waiting) => {
                debug!(task = %task, "task still waiting in this run; trigger already covered");
            }
            Some(_) => queue.record_trigger(&task),
        }
    }

    finish_if_idle(scheduler, queue, options, &mut step);
    step
}

/// Handle a task completion event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    queue: &mut TriggerQueue,
    options: &RuntimeOptions,
    task: TaskName,
    outcome: crate::engine::TaskOutcome,
) -> CoreStep {
    let mut step = CoreStep::running();

    let inner = scheduler.complete(&task, outcome);
    step.dispatch(inner.ready);
    step.blocked.extend(inner.blocked);

    if scheduler.is_idle() && !queue.is_empty() {
        let triggers = queue.drain_pending();
        step.absorb(start_new_run_from_triggers(scheduler, triggers));
    }

    finish_if_idle(scheduler, queue, options, &mut step);
    step
}

/// Seed a new run from a batch of triggers.
///
/// All triggers join the same run, so a dependency shared between them is
/// executed once.
pub fn start_new_run_from_triggers(
    scheduler: &mut Scheduler,
    triggers: Vec<TaskName>,
) -> CoreStep {
    let mut step = CoreStep::running();

    // Dedupe while keeping the caller's order.
    let mut seen = BTreeSet::new();
    let triggers: Vec<TaskName> = triggers
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect();

    if triggers.is_empty() {
        return step;
    }

    scheduler.start_new_run();

    let mut all_ready = Vec::new();
    for task in triggers {
        let inner = scheduler.trigger(&task);
        all_ready.extend(inner.ready);
        step.blocked.extend(inner.blocked);
    }
    step.dispatch(all_ready);

    step
}

/// In one-shot mode, exit once the DAG is idle and nothing is queued.
pub(crate) fn finish_if_idle(
    scheduler: &Scheduler,
    queue: &TriggerQueue,
    options: &RuntimeOptions,
    step: &mut CoreStep,
) {
    if options.exit_when_idle && scheduler.is_idle() && queue.is_empty() {
        step.keep_running = false;
        step.commands.push(CoreCommand::RequestExit);
    }
}
