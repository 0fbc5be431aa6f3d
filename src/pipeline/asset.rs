// src/pipeline/asset.rs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::warn;

use crate::config::PathSetConfig;
use crate::errors::AssetdagError;
use crate::fs::FileSystem;

/// One file travelling through a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Path of the original source file (as read from the filesystem).
    pub source: PathBuf,
    /// Output path relative to the destination directory. Steps may change
    /// its extension.
    pub relative: PathBuf,
    pub contents: Vec<u8>,
}

impl Asset {
    pub fn new(source: impl Into<PathBuf>, relative: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self {
            source: source.into(),
            relative: relative.into(),
            contents,
        }
    }

    /// Contents as UTF-8 text.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.contents)
            .with_context(|| format!("{} is not valid UTF-8", self.source.display()))
    }

    /// File name of the original source, e.g. `_vars.scss`.
    pub fn file_name(&self) -> &str {
        self.source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> Option<&str> {
        self.relative.extension().and_then(|e| e.to_str())
    }
}

/// A resolved path set: which files a task reads and where it writes them.
#[derive(Debug, Clone)]
pub struct PathSet {
    pub name: String,
    pub src: Vec<String>,
    pub exclude: Vec<String>,
    pub template: Option<PathBuf>,
    pub dest: PathBuf,
}

impl PathSet {
    pub fn from_config(name: &str, cfg: &PathSetConfig) -> Self {
        Self {
            name: name.to_string(),
            src: cfg.src.clone(),
            exclude: cfg.exclude.clone(),
            template: cfg.template.as_ref().map(PathBuf::from),
            dest: PathBuf::from(&cfg.dest),
        }
    }
}

/// The leading components of `pattern` that contain no glob
/// metacharacter: `app/js/**/*.js` -> `app/js`. A pattern without
/// metacharacters is a literal file; its base is the parent directory.
pub fn glob_base(pattern: &str) -> PathBuf {
    let is_glob = |s: &str| s.contains(['*', '?', '[', '{']);
    let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty() && *c != ".").collect();

    let base: Vec<&str> = if is_glob(pattern) {
        components.into_iter().take_while(|c| !is_glob(c)).collect()
    } else {
        let n = components.len().saturating_sub(1);
        components.into_iter().take(n).collect()
    };

    if base.is_empty() {
        PathBuf::new()
    } else {
        base.iter().collect()
    }
}

fn is_literal(pattern: &str) -> bool {
    !pattern.contains(['*', '?', '[', '{'])
}

/// Compile patterns the way gulp reads them: `*` stays inside one path
/// component, `**` crosses directories.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// A discovered source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path on the filesystem (`root` joined with the project-relative path).
    pub path: PathBuf,
    /// Path relative to the project root, `/`-separated.
    pub project_relative: String,
    /// Path relative to the pattern's glob base.
    pub relative: PathBuf,
}

/// Find every file matched by the path set, sorted and deduplicated.
///
/// Each pattern is walked from its glob base; a base directory that does not
/// exist is a [`AssetdagError::FileSystem`] error. Missing literal files are
/// logged and skipped.
pub fn discover(fs: &dyn FileSystem, root: &Path, set: &PathSet) -> crate::errors::Result<Vec<SourceFile>> {
    let exclude = if set.exclude.is_empty() {
        None
    } else {
        Some(build_globset(&set.exclude)?)
    };
    let excluded = |rel: &str| exclude.as_ref().is_some_and(|e| e.is_match(rel));

    let mut found: Vec<SourceFile> = Vec::new();

    for pattern in set.src.iter() {
        let base = glob_base(pattern);
        let base_abs = root.join(&base);

        if is_literal(pattern) {
            let path = root.join(pattern);
            if !fs.is_file(&path) {
                warn!(pattern = %pattern, path_set = %set.name, "source file does not exist; skipping");
                continue;
            }
            let rel = PathBuf::from(pattern.trim_start_matches("./"));
            let project_relative = rel.to_string_lossy().replace('\\', "/");
            if excluded(&project_relative) {
                continue;
            }
            let relative = rel
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| rel.clone());
            found.push(SourceFile {
                path,
                project_relative,
                relative,
            });
            continue;
        }

        if !fs.is_dir(&base_abs) {
            return Err(AssetdagError::FileSystem {
                path: base_abs,
                message: format!("base directory of pattern '{pattern}' does not exist"),
            });
        }

        let matcher = build_globset(std::slice::from_ref(pattern))?;
        let mut stack: Vec<(PathBuf, PathBuf)> = vec![(base_abs, PathBuf::new())];

        while let Some((dir, rel_dir)) = stack.pop() {
            let entries = fs.list_dir(&dir).map_err(|e| AssetdagError::FileSystem {
                path: dir.clone(),
                message: format!("{e:#}"),
            })?;
            for entry in entries {
                let Some(name) = entry.file_name().map(PathBuf::from) else {
                    continue;
                };
                let rel = rel_dir.join(&name);
                if fs.is_dir(&entry) {
                    stack.push((entry, rel));
                } else if fs.is_file(&entry) {
                    let project_relative = base.join(&rel).to_string_lossy().replace('\\', "/");
                    if matcher.is_match(&project_relative) && !excluded(&project_relative) {
                        found.push(SourceFile {
                            path: entry,
                            project_relative,
                            relative: rel,
                        });
                    }
                }
            }
        }
    }

    found.sort_by(|a, b| a.project_relative.cmp(&b.project_relative));
    found.dedup_by(|a, b| a.project_relative == b.project_relative);
    Ok(found)
}
