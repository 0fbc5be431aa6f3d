// src/config/mod.rs

//! Configuration loading and validation for assetdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate references, destinations and the task DAG (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_CONFIG_FILE, config_root_dir, load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigFile, ConfigSection, PathSetConfig, RawConfigFile, ServerSection, StepConfig,
    TaskConfig, WatchBindingConfig,
};
pub use validate::{relative_subdir, validate_config};
