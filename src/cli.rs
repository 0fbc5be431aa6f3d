// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `assetdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetdag",
    version,
    about = "Build, watch and serve front-end assets from a task DAG.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Assetdag.toml` in the current working directory. All paths in
    /// the config are resolved relative to the directory containing it.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task plan, but don't build anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// What to do. Defaults to `default` (build, serve, watch).
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl CliArgs {
    /// The effective command, falling back to [`Command::Default`].
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Default)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the `build` task (or every task when none is named `build`) once.
    Build,
    /// Run a single task and its dependencies once.
    Run {
        /// Task name, e.g. `style:build`.
        task: String,
    },
    /// Watch sources and re-run bound tasks on change.
    Watch,
    /// Build, then serve the output directory and watch for changes.
    Default,
    /// Delete the build output directory.
    Clean,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
