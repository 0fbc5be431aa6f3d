// src/dag/scheduler.rs

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::run::{ActiveRun, RunStep};
use crate::dag::task_state::{RunState, TaskSlot};
use crate::engine::{TaskName, TaskOutcome};

/// The immutable graph plus the state of the active run, if any.
///
/// A run starts with the first trigger after the scheduler went idle and
/// ends once every task that joined it has succeeded, failed or been
/// blocked.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    slots: HashMap<TaskName, TaskSlot>,
    runs_started: u64,
    active_run: Option<u64>,
}

impl Scheduler {
    /// Build a scheduler over a validated graph.
    pub fn new(graph: DagGraph) -> Self {
        let slots = graph
            .tasks()
            .map(|name| {
                let slot = TaskSlot {
                    deps: graph.dependencies_of(name).to_vec(),
                    state: None,
                    starts: 0,
                };
                (name.to_string(), slot)
            })
            .collect();

        Self {
            graph,
            slots,
            runs_started: 0,
            active_run: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.active_run.is_none()
    }

    pub fn active_run(&self) -> Option<u64> {
        self.active_run
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn contains(&self, task: &str) -> bool {
        self.slots.contains_key(task)
    }

    /// State of `task` in the active run; `None` when it has not joined.
    pub fn state_of(&self, task: &str) -> Option<RunState> {
        self.slots.get(task).and_then(|slot| slot.state)
    }

    /// Open a new run. Every task leaves the previous one.
    pub fn start_new_run(&mut self) {
        self.runs_started += 1;
        self.active_run = Some(self.runs_started);
        for slot in self.slots.values_mut() {
            slot.state = None;
        }
        debug!(run_id = self.runs_started, "run opened");
    }

    /// Pull `task` and its dependencies into the run, opening one when idle.
    pub fn trigger(&mut self, task: &str) -> RunStep {
        if !self.graph.contains(task) {
            warn!(task = %task, "trigger for unknown task; ignoring");
            return RunStep::default();
        }
        let run_id = match self.active_run {
            Some(id) => id,
            None => {
                self.start_new_run();
                self.runs_started
            }
        };

        let mut run = ActiveRun::new(&self.graph, &mut self.slots, run_id);
        run.join(task);
        let blocked = run.block_stuck();
        let ready = run.start_ready();
        let finished = self.close_if_settled();

        RunStep {
            ready,
            blocked,
            finished,
        }
    }

    /// Record the outcome of a running task.
    pub fn complete(&mut self, task: &str, outcome: TaskOutcome) -> RunStep {
        let Some(run_id) = self.active_run else {
            warn!(task = %task, "completion outside a run; ignoring");
            return RunStep::default();
        };

        let mut step = RunStep::default();
        match self.slots.get_mut(task) {
            Some(slot) if slot.state == Some(RunState::Running) => {
                slot.state = Some(match outcome {
                    TaskOutcome::Success => {
                        debug!(task = %task, run_id, "task succeeded");
                        RunState::Succeeded
                    }
                    TaskOutcome::Failed => {
                        warn!(task = %task, run_id, "task failed; its dependents will not run");
                        RunState::Failed
                    }
                });
                let mut run = ActiveRun::new(&self.graph, &mut self.slots, run_id);
                step.blocked = run.block_stuck();
                step.ready = run.start_ready();
            }
            Some(slot) => {
                warn!(task = %task, state = ?slot.state, "completion for a task that is not running; ignoring");
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
            }
        }

        step.finished = self.close_if_settled();
        step
    }

    fn close_if_settled(&mut self) -> bool {
        let Some(run_id) = self.active_run else {
            return false;
        };
        let run = ActiveRun::new(&self.graph, &mut self.slots, run_id);
        if !run.is_settled() {
            return false;
        }
        info!(run_id, "run settled");
        self.active_run = None;
        true
    }
}
