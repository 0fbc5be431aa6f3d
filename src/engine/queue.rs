// src/engine/queue.rs

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use super::TaskName;
use crate::types::TriggerWhileRunningBehaviour;

/// Queue of triggers that arrive while a run is already executing.
///
/// Semantics:
/// - Each queued entry is a *batch* of task names to trigger together in a
///   future run.
/// - `queue_length` (max_runs) defines how many such batches to keep; the
///   default of 1 means "at most one future run is queued".
/// - When the runtime is idle and wants to start a new run, it calls
///   `drain_pending()`, which merges all queued batches into one run.
///
/// Merging batches is safe because the scheduler executes every task at most
/// once per run.
#[derive(Debug)]
pub struct TriggerQueue {
    behaviour: TriggerWhileRunningBehaviour,
    max_runs: usize,
    runs: VecDeque<HashSet<TaskName>>,
}

impl TriggerQueue {
    /// Create a new queue with the given behaviour and maximum queued runs.
    ///
    /// `max_runs` is clamped to at least 1.
    pub fn new(behaviour: TriggerWhileRunningBehaviour, max_runs: usize) -> Self {
        Self {
            behaviour,
            max_runs: max_runs.max(1),
            runs: VecDeque::new(),
        }
    }

    /// Returns true if there are no queued triggers.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Record that a task was triggered while it is taking part in the
    /// active run.
    ///
    /// - `Queue`: merge into the last batch (coalescing repeated triggers into
    ///   the same future run); if the number of batches exceeds `max_runs`,
    ///   drop the oldest.
    /// - `Latest`: discard everything queued so far and keep a single batch
    ///   containing only this task.
    pub fn record_trigger(&mut self, task: &str) {
        let name = task.to_string();

        match self.behaviour {
            TriggerWhileRunningBehaviour::Queue => {
                if let Some(last_batch) = self.runs.back_mut() {
                    let inserted = last_batch.insert(name.clone());
                    debug!(
                        task = %name,
                        inserted,
                        "merged trigger into last queued batch (queue mode)",
                    );
                } else {
                    self.runs.push_back(HashSet::from([name.clone()]));
                    debug!(task = %name, "created first queued batch (queue mode)");
                }

                if self.runs.len() > self.max_runs {
                    warn!(
                        current_batches = self.runs.len(),
                        max_runs = self.max_runs,
                        "exceeded queue_length; dropping oldest queued batches"
                    );
                    while self.runs.len() > self.max_runs {
                        self.runs.pop_front();
                    }
                }
            }
            TriggerWhileRunningBehaviour::Latest => {
                debug!(
                    task = %name,
                    "resetting queued batches to this task only (latest mode)"
                );
                self.runs.clear();
                self.runs.push_back(HashSet::from([name]));
            }
        }
    }

    /// Drain all pending queued batches and merge them into a single vector of
    /// task names (sorted for deterministic scheduling).
    pub fn drain_pending(&mut self) -> Vec<TaskName> {
        let mut merged: HashSet<TaskName> = HashSet::new();

        while let Some(batch) = self.runs.pop_front() {
            merged.extend(batch);
        }

        let mut tasks: Vec<TaskName> = merged.into_iter().collect();
        tasks.sort();
        debug!(drained = tasks.len(), "drained queued triggers into new run");
        tasks
    }
}
