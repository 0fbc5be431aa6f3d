// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Duplicate task: '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Unknown task: '{task}'{}", required_by_suffix(.required_by))]
    UnknownTask {
        task: String,
        required_by: Option<String>,
    },

    #[error("Cyclic dependency detected involving task '{0}'")]
    CyclicDependency(String),

    #[error("Port {port} on {host} is already in use")]
    PortInUse { host: String, port: u16 },

    #[error("Filesystem error at {path:?}: {message}")]
    FileSystem { path: PathBuf, message: String },

    #[error("{} task(s) failed: {}", .0.len(), .0.join(", "))]
    TasksFailed(Vec<String>),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(parent) => format!(" (required by '{parent}')"),
        None => String::new(),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AssetdagError>;
