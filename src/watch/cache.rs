// src/watch/cache.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::fs::FileSystem;
use crate::watch::hash::compute_file_hash;

/// Last seen content hash of every file a `use_hash` binding looked at.
#[derive(Debug, Default)]
pub struct FileCache {
    hashes: HashMap<PathBuf, String>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-hash `path` and report whether its content differs from the last
    /// time it was seen. Unknown and deleted files count as changed.
    pub fn changed(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<bool> {
        if !fs.is_file(path) {
            debug!("file gone, dropping cached hash for {:?}", path);
            self.hashes.remove(path);
            return Ok(true);
        }

        let hash = compute_file_hash(fs, path)?;
        match self.hashes.insert(path.to_path_buf(), hash.clone()) {
            Some(old) if old == hash => Ok(false),
            _ => Ok(true),
        }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
