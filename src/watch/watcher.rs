// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::RuntimeEvent;
use crate::fs::FileSystem;
use crate::watch::dispatch::WatchDispatcher;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying debouncer (and its
/// `RecommendedWatcher`) is kept alive for as long as needed. Dropping this
/// handle will stop file watching.
pub struct WatcherHandle {
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch the dispatcher's root recursively and forward task triggers to the
/// runtime. Output directories are watched too; the dispatcher drops their
/// changes.
///
/// Filesystem events are debounced for `debounce`: every path that changed
/// during the quiet period arrives in one batch, and one batch triggers each
/// bound task at most once.
pub fn spawn_watcher(
    dispatcher: WatchDispatcher,
    fs: Arc<dyn FileSystem>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    debounce: Duration,
) -> Result<WatcherHandle> {
    let root: PathBuf = fs
        .canonicalize(dispatcher.root())
        .unwrap_or_else(|_| dispatcher.root().to_path_buf());

    // Channel from the blocking debouncer callback into the async world.
    let (batch_tx, mut batch_rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();

    let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| match res {
        Ok(events) => {
            let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
            if let Err(err) = batch_tx.send(paths) {
                warn!("failed to forward debounced events: {err}");
            }
        }
        Err(err) => warn!("file watch error: {err}"),
    })?;

    debouncer.watcher().watch(&root, RecursiveMode::Recursive)?;

    info!(debounce_ms = debounce.as_millis() as u64, "file watcher started on {:?}", root);

    let mut dispatcher = dispatcher;
    tokio::spawn(async move {
        while let Some(paths) = batch_rx.recv().await {
            debug!(count = paths.len(), "received debounced batch");
            if dispatcher.dispatch(&paths, &runtime_tx).await.is_none() {
                // Runtime is gone; nothing left to trigger.
                break;
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle {
        _debouncer: debouncer,
    })
}
