// src/pipeline/mod.rs

//! Transform pipeline: read the files of a path set, run every file through
//! an ordered list of [`Transform`] steps, and write the results below the
//! path set's destination, preserving the structure under the glob base.
//!
//! Files are independent. They are processed in parallel with rayon, and a
//! failing file is recorded as a [`TransformError`] without stopping the
//! others. [`Pipeline::run`] wraps [`build`] and broadcasts a [`BuildEvent`]
//! with the written paths once the batch is done.

pub mod asset;
pub mod sourcemap;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::engine::TaskName;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::transforms::{StepOutput, Transform};

pub use asset::{Asset, PathSet, SourceFile, discover, glob_base};
pub use sourcemap::{MappedWriter, Position, SourceMap};

/// Capacity of the build event broadcast channel.
pub const BUILD_EVENT_CAPACITY: usize = 32;

/// A step failed on one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    pub path: PathBuf,
    pub step: String,
    pub message: String,
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.path.display(),
            self.step,
            self.message
        )
    }
}

impl std::error::Error for TransformError {}

/// Result of building one path set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Written files (outputs and their `.map` files), sorted.
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<TransformError>,
    /// Sources a step chose not to emit (e.g. Sass partials).
    pub skipped: Vec<PathBuf>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Broadcast after a pipeline task finished writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEvent {
    pub task: TaskName,
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Write chained `.map` files for CSS and JS outputs.
    pub sourcemaps: bool,
}

enum FileResult {
    Written(Vec<PathBuf>),
    Skipped(PathBuf),
    Failed(TransformError),
}

/// Build every file of `set` through `steps`.
///
/// Discovery errors (a missing glob base, an unreadable directory) fail the
/// whole build. Errors on single files are collected in the report.
pub fn build(
    fs: &dyn FileSystem,
    root: &Path,
    set: &PathSet,
    steps: &[Box<dyn Transform>],
    options: BuildOptions,
) -> Result<BuildReport> {
    let sources = discover(fs, root, set)?;
    let dest = root.join(&set.dest);
    debug!(path_set = %set.name, files = sources.len(), dest = %dest.display(), "building path set");

    let results: Vec<FileResult> = sources
        .par_iter()
        .map(|source| process_file(fs, &dest, source, steps, options))
        .collect();

    let mut report = BuildReport::default();
    for result in results {
        match result {
            FileResult::Written(paths) => report.outputs.extend(paths),
            FileResult::Skipped(path) => report.skipped.push(path),
            FileResult::Failed(err) => {
                warn!(path = %err.path.display(), step = %err.step, "{}", err.message);
                report.failures.push(err);
            }
        }
    }
    report.outputs.sort();

    Ok(report)
}

fn process_file(
    fs: &dyn FileSystem,
    dest: &Path,
    source: &SourceFile,
    steps: &[Box<dyn Transform>],
    options: BuildOptions,
) -> FileResult {
    let fail = |step: &str, message: String| {
        FileResult::Failed(TransformError {
            path: source.path.clone(),
            step: step.to_string(),
            message,
        })
    };

    let contents = match fs.read(&source.path) {
        Ok(bytes) => bytes,
        Err(e) => return fail("read", format!("{e:#}")),
    };

    let mut asset = Asset::new(&source.path, &source.relative, contents);
    let mut chain: Option<SourceMap> = None;

    for step in steps.iter() {
        match step.apply(&asset) {
            Ok(Some(StepOutput {
                contents,
                map,
                extension,
            })) => {
                asset.contents = contents;
                if let Some(ext) = extension {
                    asset.relative.set_extension(ext);
                }
                if let Some(map) = map {
                    chain = Some(match chain.take() {
                        Some(previous) => map.compose(&previous),
                        None => map,
                    });
                }
            }
            Ok(None) => {
                debug!(path = %source.project_relative, step = step.name(), "dropped by step");
                return FileResult::Skipped(source.path.clone());
            }
            Err(e) => return fail(step.name(), format!("{e:#}")),
        }
    }

    let out_path = dest.join(&asset.relative);
    let comment = comment_style(&asset);

    let mut written = Vec::with_capacity(2);
    match (options.sourcemaps, comment, std::str::from_utf8(&asset.contents)) {
        (true, Some(style), Ok(text)) => {
            let file_name = asset
                .relative
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let map_name = format!("{file_name}.map");
            let map_path = out_path.with_file_name(&map_name);

            let mut map = chain.unwrap_or_else(|| SourceMap::identity(&source.project_relative, text));
            map.set_source_name(0, &source.project_relative);

            let mut text = text.to_string();
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&style.url_comment(&map_name));

            if let Err(e) = fs.write(&out_path, text.as_bytes()) {
                return fail("write", format!("{e:#}"));
            }
            if let Err(e) = fs.write(&map_path, map.to_json(&file_name).as_bytes()) {
                return fail("write", format!("{e:#}"));
            }
            written.push(out_path);
            written.push(map_path);
        }
        _ => {
            if let Err(e) = fs.write(&out_path, &asset.contents) {
                return fail("write", format!("{e:#}"));
            }
            written.push(out_path);
        }
    }

    FileResult::Written(written)
}

#[derive(Clone, Copy)]
enum CommentStyle {
    Css,
    Js,
}

impl CommentStyle {
    fn url_comment(self, map_name: &str) -> String {
        match self {
            CommentStyle::Css => format!("/*# sourceMappingURL={map_name} */\n"),
            CommentStyle::Js => format!("//# sourceMappingURL={map_name}\n"),
        }
    }
}

fn comment_style(asset: &Asset) -> Option<CommentStyle> {
    match asset.extension() {
        Some("css") => Some(CommentStyle::Css),
        Some("js") => Some(CommentStyle::Js),
        _ => None,
    }
}

/// A configured pipeline task: one path set, its steps, and where to
/// announce finished builds.
pub struct Pipeline {
    task: TaskName,
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    set: PathSet,
    steps: Vec<Box<dyn Transform>>,
    options: BuildOptions,
    events: Option<broadcast::Sender<BuildEvent>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("task", &self.task)
            .field("root", &self.root)
            .field("set", &self.set.name)
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        task: impl Into<TaskName>,
        fs: Arc<dyn FileSystem>,
        root: impl Into<PathBuf>,
        set: PathSet,
        steps: Vec<Box<dyn Transform>>,
        options: BuildOptions,
    ) -> Self {
        Self {
            task: task.into(),
            fs,
            root: root.into(),
            set,
            steps,
            options,
            events: None,
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Build the path set and broadcast the written paths.
    ///
    /// The event is sent whenever discovery succeeded, even if some files
    /// failed, so clients still see the outputs that were written.
    pub fn run(&self) -> Result<BuildReport> {
        let report = build(
            self.fs.as_ref(),
            &self.root,
            &self.set,
            &self.steps,
            self.options,
        )?;

        info!(
            task = %self.task,
            outputs = report.outputs.len(),
            failures = report.failures.len(),
            skipped = report.skipped.len(),
            "pipeline finished"
        );

        if let Some(events) = self.events.as_ref() {
            // No receivers is fine: nobody is serving.
            let _ = events.send(BuildEvent {
                task: self.task.clone(),
                outputs: report.outputs.clone(),
            });
        }

        Ok(report)
    }
}
