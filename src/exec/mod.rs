// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the production
//!   `ActionExecutor`, which tests can replace with a fake implementation.
//! - [`task_runner`] runs one task action and reports its outcome to the
//!   runtime via `RuntimeEvent::TaskCompleted`.

pub mod backend;
pub mod task_runner;

pub use backend::{ActionExecutor, ExecutorBackend};
