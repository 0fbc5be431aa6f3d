// src/exec/task_runner.rs

//! Runs a single task action and reports its outcome.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::registry::TaskAction;

/// Execute `action` on the blocking pool and send `TaskCompleted`.
///
/// Action errors and panics both count as a failed task; neither stops the
/// runtime.
pub async fn run_task(
    task: ScheduledTask,
    action: Arc<dyn TaskAction>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    info!(task = %task.name, run_id = task.run_id, "starting task");
    let started = Instant::now();

    let joined = tokio::task::spawn_blocking(move || action.execute()).await;

    let outcome = match joined {
        Ok(Ok(())) => {
            info!(
                task = %task.name,
                run_id = task.run_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "task finished"
            );
            TaskOutcome::Success
        }
        Ok(Err(err)) => {
            error!(
                task = %task.name,
                run_id = task.run_id,
                error = %format!("{err:#}"),
                "task failed"
            );
            TaskOutcome::Failed
        }
        Err(join_err) => {
            error!(
                task = %task.name,
                run_id = task.run_id,
                error = %join_err,
                "task action panicked"
            );
            TaskOutcome::Failed
        }
    };

    if let Err(err) = runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: task.name.clone(),
            outcome,
        })
        .await
    {
        error!(task = %task.name, error = %err, "runtime channel closed; dropping completion");
    }
}
