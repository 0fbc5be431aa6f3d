// src/watch/dispatch.rs

//! Turning debounced batches of changed paths into task triggers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::engine::{RuntimeEvent, TaskName, TriggerReason};
use crate::fs::FileSystem;
use crate::watch::bindings::WatchBinding;
use crate::watch::cache::FileCache;

/// Maps changed paths to tasks and sends the triggers to the runtime.
#[derive(Debug)]
pub struct WatchDispatcher {
    root: PathBuf,
    bindings: Vec<WatchBinding>,
    /// Project-relative directories whose changes are never dispatched.
    ignored: Vec<PathBuf>,
    fs: Arc<dyn FileSystem>,
    cache: FileCache,
}

impl WatchDispatcher {
    pub fn new(
        root: impl Into<PathBuf>,
        bindings: Vec<WatchBinding>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            root: root.into(),
            bindings,
            ignored: Vec::new(),
            fs,
            cache: FileCache::new(),
        }
    }

    /// Ignore changes under these project-relative directories, typically
    /// build outputs, so tasks are not re-triggered by their own writes.
    pub fn with_ignored(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.ignored.extend(dirs);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tasks to trigger for one batch of changed paths.
    ///
    /// Bound tasks come out in binding order, each at most once, including
    /// tasks that another selected task depends on. Bindings with
    /// `use_hash` ignore paths whose content did not change. Paths under an
    /// ignored directory match nothing.
    pub fn select_tasks(&mut self, paths: &[PathBuf]) -> Vec<TaskName> {
        let mut changed: Vec<(PathBuf, String)> = Vec::new();
        for path in paths {
            match relative_str(self.fs.as_ref(), &self.root, path) {
                Some(rel) if self.is_ignored(&rel) => {
                    trace!(path = %rel, "change under an output directory; ignoring")
                }
                Some(rel) => changed.push((path.clone(), rel)),
                None => warn!(
                    "could not relativize path {:?} against root {:?}",
                    path, self.root
                ),
            }
        }

        // Hash each path at most once per batch, and only when a `use_hash`
        // binding cares about it.
        let mut content_changed: HashMap<PathBuf, bool> = HashMap::new();
        let mut selected: Vec<TaskName> = Vec::new();

        for binding in self.bindings.iter() {
            let mut fired = false;
            for (abs, rel) in changed.iter() {
                if !binding.matches(rel) {
                    continue;
                }
                if binding.use_hash() {
                    let differs = match content_changed.get(abs) {
                        Some(&d) => d,
                        None => {
                            let d = self.cache.changed(self.fs.as_ref(), abs).unwrap_or_else(|err| {
                                warn!(path = %rel, error = %err, "failed to hash file; triggering anyway");
                                true
                            });
                            content_changed.insert(abs.clone(), d);
                            d
                        }
                    };
                    if !differs {
                        info!(path = %rel, pattern = %binding.pattern(), "content unchanged; skipping");
                        continue;
                    }
                }
                debug!(path = %rel, pattern = %binding.pattern(), "watch match");
                fired = true;
                // Keep hashing the rest so the cache stays current.
                if !binding.use_hash() {
                    break;
                }
            }

            if fired {
                for task in binding.tasks() {
                    if !selected.contains(task) {
                        selected.push(task.clone());
                    }
                }
            }
        }

        if !selected.is_empty() {
            debug!(?selected, "tasks selected for this batch");
        }
        selected
    }

    fn is_ignored(&self, rel: &str) -> bool {
        let rel = Path::new(rel);
        self.ignored.iter().any(|dir| rel.starts_with(dir))
    }

    /// Select tasks for `paths` and send one trigger per task.
    ///
    /// Returns the triggered tasks, or `None` when the runtime is gone.
    pub async fn dispatch(
        &mut self,
        paths: &[PathBuf],
        runtime_tx: &mpsc::Sender<RuntimeEvent>,
    ) -> Option<Vec<TaskName>> {
        let tasks = self.select_tasks(paths);
        for task in tasks.iter() {
            info!(task = %task, "file change -> triggering task");
            if let Err(err) = runtime_tx
                .send(RuntimeEvent::TaskTriggered {
                    task: task.clone(),
                    reason: TriggerReason::FileWatch,
                })
                .await
            {
                warn!("failed to send RuntimeEvent::TaskTriggered: {err}");
                return None;
            }
        }
        Some(tasks)
    }
}

/// `path` relative to `root`, `/`-separated.
///
/// Falls back to canonical forms of both paths when the event uses another
/// absolute prefix for the same directory (symlinks, `/private/var` on
/// macOS).
fn relative_str(fs: &dyn FileSystem, root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }
    if path.is_relative() {
        let rel = path.strip_prefix(".").unwrap_or(path);
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }

    let root_canon = fs.canonicalize(root).ok()?;
    // Deleted files cannot be canonicalized; their parent usually can.
    let path_canon = fs.canonicalize(path).ok().or_else(|| {
        let parent = fs.canonicalize(path.parent()?).ok()?;
        Some(parent.join(path.file_name()?))
    })?;
    path_canon
        .strip_prefix(&root_canon)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}
