// src/dag/mod.rs

//! Task graph and the per-run scheduler.
//!
//! [`DagGraph`] is immutable once built. [`Scheduler`] walks it one run at a
//! time: triggered tasks pull their dependencies into the run, tasks start
//! once everything they depend on has succeeded, and a failure blocks
//! whatever sits behind it.

pub mod graph;
pub mod run;
pub mod scheduler;
pub mod task_state;

pub use graph::DagGraph;
pub use run::RunStep;
pub use scheduler::Scheduler;
pub use task_state::{RunState, ScheduledTask};
