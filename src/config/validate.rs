use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::DagGraph;
use crate::errors::{AssetdagError, Result};
use crate::pipeline::glob_base;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AssetdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Run every semantic check on a raw config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_path_sets(cfg)?;
    validate_task_paths(cfg)?;
    validate_watch_bindings(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> AssetdagError {
    AssetdagError::ConfigError(msg.into())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(config_error(
            "config must contain at least one [task.<name>] section",
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.queue_length == 0 {
        return Err(config_error("[config].queue_length must be >= 1 (got 0)"));
    }
    validate_clean_dir(cfg)
}

/// `clean` deletes a directory recursively, so it must name a proper
/// subdirectory of the project that holds no sources.
fn validate_clean_dir(cfg: &RawConfigFile) -> Result<()> {
    let raw = cfg.config.clean.trim();
    let clean = relative_subdir(raw).ok_or_else(|| {
        config_error(format!(
            "[config].clean must be a subdirectory of the project without '..' (got '{raw}')"
        ))
    })?;

    for (name, set) in cfg.paths.iter() {
        let bases = set
            .src
            .iter()
            .map(|pattern| glob_base(pattern))
            .chain(set.template.iter().map(|t| relative_subdir(t).unwrap_or_default()));
        for base in bases {
            if base.starts_with(&clean) {
                return Err(config_error(format!(
                    "[config].clean = '{raw}' would delete sources of [paths.{name}] under '{}'",
                    base.display()
                )));
            }
        }
    }
    Ok(())
}

/// `dir` as a normalized relative path, or `None` when it is empty, absolute,
/// climbs with `..` or names the project root itself.
pub fn relative_subdir(dir: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(dir).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

fn validate_path_sets(cfg: &RawConfigFile) -> Result<()> {
    for (name, set) in cfg.paths.iter() {
        if set.src.is_empty() {
            return Err(config_error(format!(
                "[paths.{name}] must list at least one `src` pattern"
            )));
        }
        for pattern in set.src.iter().chain(set.exclude.iter()) {
            Glob::new(pattern).map_err(|e| {
                config_error(format!("[paths.{name}] has invalid glob '{pattern}': {e}"))
            })?;
        }
    }
    Ok(())
}

/// Every `paths` reference must exist, steps need a path set, and two
/// pipeline tasks may not write into the same directory.
fn validate_task_paths(cfg: &RawConfigFile) -> Result<()> {
    let mut dest_owner: HashMap<String, &str> = HashMap::new();

    for (name, task) in cfg.task.iter() {
        let Some(set_name) = task.paths.as_ref() else {
            if !task.steps.is_empty() {
                return Err(config_error(format!(
                    "task '{name}' declares steps but no `paths`"
                )));
            }
            continue;
        };

        let set = cfg.paths.get(set_name).ok_or_else(|| {
            config_error(format!(
                "task '{name}' references unknown path set '{set_name}'"
            ))
        })?;

        let dest = normalize_dir(&set.dest);
        if let Some(other) = dest_owner.insert(dest.clone(), name.as_str()) {
            return Err(config_error(format!(
                "tasks '{other}' and '{name}' both write to '{dest}'"
            )));
        }
    }
    Ok(())
}

fn validate_watch_bindings(cfg: &RawConfigFile) -> Result<()> {
    for (i, binding) in cfg.watch.iter().enumerate() {
        Glob::new(&binding.pattern).map_err(|e| {
            config_error(format!(
                "[[watch]] #{i} has invalid pattern '{}': {e}",
                binding.pattern
            ))
        })?;
        if binding.tasks.is_empty() {
            return Err(config_error(format!(
                "[[watch]] #{i} ('{}') lists no tasks",
                binding.pattern
            )));
        }
        for task in binding.tasks.iter() {
            if !cfg.task.contains_key(task) {
                return Err(AssetdagError::UnknownTask {
                    task: task.clone(),
                    required_by: Some(format!("watch '{}'", binding.pattern)),
                });
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    DagGraph::from_specs(
        cfg.task
            .iter()
            .map(|(name, task)| (name.as_str(), task.after.as_slice())),
    )
    .validate()
}

/// `build/css/`, `./build/css` and `build/css` name the same directory.
fn normalize_dir(dir: &str) -> String {
    let trimmed = dir.trim().trim_end_matches('/');
    trimmed.strip_prefix("./").unwrap_or(trimmed).to_string()
}
