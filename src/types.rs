use serde::Deserialize;

/// Behaviour when a watch trigger arrives for a task that is already part of
/// the active run.
///
/// - `Queue`: remember the trigger and start another run when the current one
///   finishes (default behaviour).
/// - `Latest`: drop any previously queued batch and only keep the most recent
///   trigger. The active run is never interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerWhileRunningBehaviour {
    #[default]
    Queue,
    Latest,
}
