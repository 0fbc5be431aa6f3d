#![allow(dead_code)]

use std::collections::BTreeMap;

use assetdag::config::{
    ConfigFile, ConfigSection, PathSetConfig, RawConfigFile, ServerSection, StepConfig,
    TaskConfig, WatchBindingConfig,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                paths: BTreeMap::new(),
                task: BTreeMap::new(),
                watch: Vec::new(),
                server: ServerSection::default(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_path_set(mut self, name: &str, src: &[&str], dest: &str) -> Self {
        self.config.paths.insert(
            name.to_string(),
            PathSetConfig {
                src: src.iter().map(|s| s.to_string()).collect(),
                exclude: Vec::new(),
                template: None,
                dest: dest.to_string(),
            },
        );
        self
    }

    pub fn with_watch(mut self, pattern: &str, tasks: &[&str]) -> Self {
        self.config.watch.push(WatchBindingConfig {
            pattern: pattern.to_string(),
            tasks: tasks.iter().map(|s| s.to_string()).collect(),
            use_hash: false,
        });
        self
    }

    pub fn with_hashed_watch(mut self, pattern: &str, tasks: &[&str]) -> Self {
        self.config.watch.push(WatchBindingConfig {
            pattern: pattern.to_string(),
            tasks: tasks.iter().map(|s| s.to_string()).collect(),
            use_hash: true,
        });
        self
    }

    pub fn with_clean(mut self, dir: &str) -> Self {
        self.config.config.clean = dir.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// A group task: no path set, no steps.
    pub fn group() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    /// A pipeline task over the path set `paths`.
    pub fn pipeline(paths: &str) -> Self {
        Self {
            task: TaskConfig {
                paths: Some(paths.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn step(mut self, step: StepConfig) -> Self {
        self.task.steps.push(step);
        self
    }

    pub fn sourcemaps(mut self, val: bool) -> Self {
        self.task.sourcemaps = val;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
