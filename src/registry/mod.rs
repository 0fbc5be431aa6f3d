// src/registry/mod.rs

//! Task registry: named tasks, their dependencies and their actions.
//!
//! The registry is the entry point for executing tasks. `run` validates the
//! dependency graph, then drives the engine (`CoreRuntime` + `Runtime`) with
//! an [`ActionExecutor`] until every task of the invocation is terminal.
//! Dependencies run before dependents, each at most once per invocation, and
//! independent tasks run concurrently.

pub mod action;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dag::{DagGraph, Scheduler};
use crate::engine::{
    CoreRuntime, RunSummary, Runtime, RuntimeEvent, RuntimeOptions, TaskName,
    TriggerWhileRunningBehaviour,
};
use crate::errors::{AssetdagError, Result};
use crate::exec::ActionExecutor;

pub use action::{GroupAction, TaskAction};

/// Capacity of the runtime event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

struct RegisteredTask {
    name: TaskName,
    deps: Vec<TaskName>,
    action: Arc<dyn TaskAction>,
}

/// How triggers that arrive during a long-lived session are coalesced.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub behaviour: TriggerWhileRunningBehaviour,
    pub queue_length: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            behaviour: TriggerWhileRunningBehaviour::default(),
            queue_length: 1,
        }
    }
}

/// Registry of named tasks, kept in registration order.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Vec<RegisteredTask>,
    index: HashMap<TaskName, usize>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task.
    ///
    /// Fails with [`AssetdagError::DuplicateTask`] when `name` is taken; the
    /// registry is left unchanged. Dependencies may name tasks registered
    /// later; they are checked by [`validate`](Self::validate) and `run`.
    pub fn register(
        &mut self,
        name: impl Into<TaskName>,
        deps: Vec<TaskName>,
        action: Arc<dyn TaskAction>,
    ) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(AssetdagError::DuplicateTask(name));
        }

        debug!(task = %name, ?deps, "registering task");
        self.index.insert(name.clone(), self.tasks.len());
        self.tasks.push(RegisteredTask { name, deps, action });
        Ok(())
    }

    /// Register a task without an action of its own.
    pub fn register_group(&mut self, name: impl Into<TaskName>, deps: Vec<TaskName>) -> Result<()> {
        self.register(name, deps, Arc::new(GroupAction))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    /// Declared dependencies of `name`.
    pub fn dependencies_of(&self, name: &str) -> Option<&[TaskName]> {
        self.index.get(name).map(|&i| self.tasks[i].deps.as_slice())
    }

    pub fn graph(&self) -> DagGraph {
        DagGraph::from_specs(self.tasks.iter().map(|t| (t.name.as_str(), t.deps.as_slice())))
    }

    /// Check the whole graph: every dependency must be registered and there
    /// must be no cycle.
    pub fn validate(&self) -> Result<()> {
        self.graph().validate()
    }

    /// Execution order for `name`: its transitive dependencies first, then
    /// `name` itself, each listed once.
    pub fn plan(&self, name: &str) -> Result<Vec<TaskName>> {
        self.graph().plan_for(name)
    }

    /// Run `name` and its dependencies once.
    pub async fn run(&self, name: &str) -> Result<RunSummary> {
        self.run_many(&[name.to_string()]).await
    }

    /// Run several targets in one invocation. Shared dependencies still run
    /// once.
    pub async fn run_many(&self, targets: &[TaskName]) -> Result<RunSummary> {
        if targets.is_empty() {
            return Ok(RunSummary::default());
        }

        let (tx, rx) = mpsc::channel::<RuntimeEvent>(EVENT_CHANNEL_CAPACITY);
        let summary = self
            .drive(
                targets.to_vec(),
                tx,
                rx,
                RuntimeOptions {
                    exit_when_idle: true,
                },
                SessionOptions::default(),
            )
            .await?;

        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            blocked = summary.blocked.len(),
            "run finished"
        );
        Ok(summary)
    }

    /// Drive the engine with caller-provided channels.
    ///
    /// `initial` targets form the first run. Further `RuntimeEvent`s (watch
    /// triggers, shutdown) are read from `rx` until the core asks to stop.
    /// `tx` must be a sender for `rx`; the executor reports completions on it.
    pub async fn drive(
        &self,
        initial: Vec<TaskName>,
        tx: mpsc::Sender<RuntimeEvent>,
        rx: mpsc::Receiver<RuntimeEvent>,
        options: RuntimeOptions,
        session: SessionOptions,
    ) -> Result<RunSummary> {
        let graph = self.graph();
        graph.closure_of(initial.iter().map(String::as_str))?;
        graph.validate()?;

        let actions: HashMap<TaskName, Arc<dyn TaskAction>> = self
            .tasks
            .iter()
            .map(|t| (t.name.clone(), Arc::clone(&t.action)))
            .collect();

        let scheduler = Scheduler::new(graph);
        let core = CoreRuntime::new(scheduler, session.behaviour, session.queue_length, options);
        let executor = ActionExecutor::new(tx, actions);

        Runtime::new(core, rx, executor)
            .with_initial_targets(initial)
            .run()
            .await
    }
}
