// src/engine/mod.rs

//! Event-driven build engine.
//!
//! Watchers, the executor and Ctrl-C all speak [`RuntimeEvent`]. The
//! synchronous [`CoreRuntime`] decides what to do with each one; the async
//! [`Runtime`] feeds it events and hands ready tasks to an executor.

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;
pub mod summary;

pub use crate::types::TriggerWhileRunningBehaviour;
pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::TriggerQueue;
pub use runtime::Runtime;
pub use summary::RunSummary;

pub type TaskName = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// CLI command or the initial build.
    Manual,
    /// A watched file changed.
    FileWatch,
}

#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Stop once the scheduler is idle and nothing is queued. One-shot
    /// commands set this; watch mode does not.
    pub exit_when_idle: bool,
}

#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    TaskTriggered {
        task: TaskName,
        reason: TriggerReason,
    },
    TaskCompleted {
        task: TaskName,
        outcome: TaskOutcome,
    },
    /// Ctrl-C or the caller dropping the session.
    ShutdownRequested,
}
