// src/registry/action.rs

use anyhow::Result;

/// The work a task performs once its dependencies have succeeded.
///
/// Actions run on Tokio's blocking pool, so they may do synchronous IO and
/// CPU-heavy work. Returning `Err` marks the task failed for the run.
pub trait TaskAction: Send + Sync {
    fn execute(&self) -> Result<()>;
}

impl<F> TaskAction for F
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn execute(&self) -> Result<()> {
        self()
    }
}

/// Action of a group task such as `build`: it only exists to pull in its
/// dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupAction;

impl TaskAction for GroupAction {
    fn execute(&self) -> Result<()> {
        Ok(())
    }
}
