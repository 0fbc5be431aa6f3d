// src/watch/bindings.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};

use crate::config::WatchBindingConfig;
use crate::engine::TaskName;

/// A compiled `[[watch]]` entry: a glob over project-relative paths and the
/// tasks to trigger when a matching file changes.
#[derive(Clone)]
pub struct WatchBinding {
    pattern: String,
    tasks: Vec<TaskName>,
    use_hash: bool,
    matcher: GlobMatcher,
}

impl fmt::Debug for WatchBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchBinding")
            .field("pattern", &self.pattern)
            .field("tasks", &self.tasks)
            .field("use_hash", &self.use_hash)
            .finish_non_exhaustive()
    }
}

impl WatchBinding {
    pub fn new(pattern: impl Into<String>, tasks: Vec<TaskName>, use_hash: bool) -> Result<Self> {
        let pattern = pattern.into();
        let matcher = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid watch pattern: {pattern}"))?
            .compile_matcher();
        Ok(Self {
            pattern,
            tasks,
            use_hash,
            matcher,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn tasks(&self) -> &[TaskName] {
        &self.tasks
    }

    /// Only trigger when the file's content actually changed.
    pub fn use_hash(&self) -> bool {
        self.use_hash
    }

    /// `rel_path` is relative to the project root, `/`-separated.
    pub fn matches(&self, rel_path: &str) -> bool {
        self.matcher.is_match(rel_path)
    }
}

/// Compile config bindings, keeping their file order.
pub fn compile_bindings(configs: &[WatchBindingConfig]) -> Result<Vec<WatchBinding>> {
    configs
        .iter()
        .map(|c| WatchBinding::new(&c.pattern, c.tasks.clone(), c.use_hash))
        .collect()
}
