// src/project.rs

//! Turning a validated config into runnable pieces: a [`TaskRegistry`] of
//! pipeline and group tasks, and a [`WatchDispatcher`] for the bindings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::broadcast;
use tracing::{error, warn};

use crate::config::{ConfigFile, relative_subdir};
use crate::errors::{AssetdagError, Result};
use crate::fs::FileSystem;
use crate::pipeline::{BuildEvent, BuildOptions, PathSet, Pipeline};
use crate::registry::{TaskAction, TaskRegistry};
use crate::transforms;
use crate::watch::{WatchDispatcher, compile_bindings};

/// Task action that runs one [`Pipeline`].
///
/// The task fails when discovery fails or when any file failed; the files
/// that did build are still written and announced.
#[derive(Debug)]
pub struct PipelineAction {
    pipeline: Pipeline,
}

impl PipelineAction {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }
}

impl TaskAction for PipelineAction {
    fn execute(&self) -> anyhow::Result<()> {
        let report = self.pipeline.run()?;
        if report.is_success() {
            return Ok(());
        }
        for failure in report.failures.iter() {
            error!(task = %self.pipeline.task(), "{failure}");
        }
        Err(anyhow!(
            "{} file(s) failed in task '{}'",
            report.failures.len(),
            self.pipeline.task()
        ))
    }
}

/// A loaded project: the config plus the directory its paths are relative
/// to.
#[derive(Debug)]
pub struct Project {
    pub config: ConfigFile,
    pub root: PathBuf,
    pub fs: Arc<dyn FileSystem>,
}

impl Project {
    pub fn new(config: ConfigFile, root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            config,
            root: root.into(),
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register every configured task and validate the resulting graph.
    ///
    /// Tasks with `paths` become pipelines; the rest are groups. When
    /// `events` is given, pipelines announce their outputs on it.
    pub fn registry(&self, events: Option<broadcast::Sender<BuildEvent>>) -> Result<TaskRegistry> {
        let mut registry = TaskRegistry::new();

        for (name, task) in self.config.tasks().iter() {
            let Some(set_name) = task.paths.as_deref() else {
                if !task.steps.is_empty() {
                    warn!(task = %name, "task has steps but no paths; steps are ignored");
                }
                registry.register_group(name.clone(), task.after.clone())?;
                continue;
            };

            let set_cfg = self.config.path_sets().get(set_name).ok_or_else(|| {
                AssetdagError::ConfigError(format!(
                    "task '{name}' refers to unknown path set '{set_name}'"
                ))
            })?;
            let set = PathSet::from_config(set_name, set_cfg);
            let steps = task
                .steps
                .iter()
                .map(|step| transforms::from_config(step, Arc::clone(&self.fs), &self.root, &set))
                .collect();

            let mut pipeline = Pipeline::new(
                name.clone(),
                Arc::clone(&self.fs),
                self.root.clone(),
                set,
                steps,
                BuildOptions {
                    sourcemaps: task.sourcemaps,
                },
            );
            if let Some(events) = events.as_ref() {
                pipeline = pipeline.with_events(events.clone());
            }

            let action: Arc<dyn TaskAction> = Arc::new(PipelineAction::new(pipeline));
            registry.register(name.clone(), task.after.clone(), action)?;
        }

        registry.validate()?;
        Ok(registry)
    }

    /// Dispatcher for the `[[watch]]` bindings, in declaration order.
    ///
    /// Changes under the served directory and the path-set destinations are
    /// ignored.
    pub fn dispatcher(&self) -> Result<WatchDispatcher> {
        let bindings = compile_bindings(self.config.watch_bindings())?;
        Ok(WatchDispatcher::new(self.root.clone(), bindings, Arc::clone(&self.fs))
            .with_ignored(self.output_dirs()))
    }

    /// Project-relative directories that builds write to.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        let served = std::iter::once(self.config.server().root.as_str());
        let dests = self.config.path_sets().values().map(|set| set.dest.as_str());
        for dir in served.chain(dests).filter_map(relative_subdir) {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }

    /// Targets for `assetdag build`: the `build` task when there is one,
    /// otherwise every task.
    pub fn build_targets(&self) -> Vec<String> {
        if self.config.tasks().contains_key("build") {
            vec!["build".to_string()]
        } else {
            self.config.tasks().keys().cloned().collect()
        }
    }

    /// Directory removed by `assetdag clean`.
    pub fn clean_dir(&self) -> PathBuf {
        self.root.join(&self.config.settings().clean)
    }
}
