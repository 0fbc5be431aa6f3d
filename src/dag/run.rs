// src/dag/run.rs

//! State transitions inside a single run.

use std::collections::HashMap;

use tracing::debug;

use crate::dag::graph::DagGraph;
use crate::dag::task_state::{RunState, ScheduledTask, TaskSlot};
use crate::engine::TaskName;

/// What one trigger or completion changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStep {
    /// Tasks to hand to the executor now.
    pub ready: Vec<ScheduledTask>,
    /// Tasks newly blocked by a failed dependency.
    pub blocked: Vec<TaskName>,
    /// This step settled the run.
    pub finished: bool,
}

/// Mutable view over the task slots for the run `run_id`.
pub(crate) struct ActiveRun<'a> {
    graph: &'a DagGraph,
    slots: &'a mut HashMap<TaskName, TaskSlot>,
    run_id: u64,
}

impl<'a> ActiveRun<'a> {
    pub fn new(
        graph: &'a DagGraph,
        slots: &'a mut HashMap<TaskName, TaskSlot>,
        run_id: u64,
    ) -> Self {
        Self {
            graph,
            slots,
            run_id,
        }
    }

    /// Add `target` and everything it depends on to the run. Tasks already
    /// in the run keep their state.
    pub fn join(&mut self, target: &str) {
        let mut stack = vec![target.to_string()];
        while let Some(name) = stack.pop() {
            let Some(slot) = self.slots.get_mut(&name) else {
                continue;
            };
            if slot.state.is_some() {
                continue;
            }
            slot.state = Some(RunState::Waiting);
            stack.extend(slot.deps.iter().cloned());
        }
    }

    /// Block every waiting task that sits behind a failed or blocked one.
    pub fn block_stuck(&mut self) -> Vec<TaskName> {
        let mut blocked = Vec::new();
        loop {
            let stuck: Vec<TaskName> = self
                .in_graph_order()
                .filter(|name| self.slots[*name].state == Some(RunState::Waiting))
                .filter(|name| {
                    self.slots[*name].deps.iter().any(|dep| {
                        self.slots
                            .get(dep)
                            .and_then(|d| d.state)
                            .is_some_and(RunState::stops_dependents)
                    })
                })
                .map(str::to_string)
                .collect();
            if stuck.is_empty() {
                return blocked;
            }
            for name in stuck {
                if let Some(slot) = self.slots.get_mut(&name) {
                    slot.state = Some(RunState::Blocked);
                }
                debug!(task = %name, run_id = self.run_id, "blocked by a failed dependency");
                blocked.push(name);
            }
        }
    }

    /// Start every waiting task whose dependencies all succeeded, in graph
    /// declaration order.
    pub fn start_ready(&mut self) -> Vec<ScheduledTask> {
        let ready: Vec<TaskName> = self
            .in_graph_order()
            .filter(|name| {
                let slot = &self.slots[*name];
                slot.state == Some(RunState::Waiting)
                    && slot.deps.iter().all(|dep| {
                        self.slots.get(dep).and_then(|d| d.state) == Some(RunState::Succeeded)
                    })
            })
            .map(str::to_string)
            .collect();

        ready
            .into_iter()
            .filter_map(|name| {
                let slot = self.slots.get_mut(&name)?;
                slot.state = Some(RunState::Running);
                slot.starts += 1;
                debug!(task = %name, run_id = self.run_id, starts = slot.starts, "task ready");
                Some(ScheduledTask {
                    name,
                    run_id: self.run_id,
                })
            })
            .collect()
    }

    /// Every task in the run has settled.
    pub fn is_settled(&self) -> bool {
        self.slots
            .values()
            .filter_map(|slot| slot.state)
            .all(RunState::is_settled)
    }

    fn in_graph_order(&self) -> impl Iterator<Item = &'a str> + use<'a> {
        let graph: &'a DagGraph = self.graph;
        graph.tasks()
    }
}
