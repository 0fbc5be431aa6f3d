use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::TriggerWhileRunningBehaviour;

/// Configuration exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [config]
/// debounce_ms = 200
///
/// [paths.style]
/// src = ["app/stylesheets/main.scss"]
/// dest = "build/css/"
///
/// [task."style:build"]
/// paths = "style"
/// sourcemaps = true
/// steps = [{ kind = "prefix" }, { kind = "sass" }, { kind = "minify-css" }]
///
/// [task.build]
/// after = ["style:build"]
///
/// [[watch]]
/// pattern = "app/stylesheets/**/*.scss"
/// tasks = ["style:build"]
///
/// [server]
/// port = 9080
/// ```
///
/// All sections are optional and have reasonable defaults, but validation
/// requires at least one task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Path sets from `[paths.<category>]`.
    #[serde(default)]
    pub paths: BTreeMap<String, PathSetConfig>,

    /// Tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// Watch bindings from `[[watch]]`, in file order.
    #[serde(default)]
    pub watch: Vec<WatchBindingConfig>,

    #[serde(default)]
    pub server: ServerSection,
}

/// Validated configuration. Only constructed through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    config: ConfigSection,
    paths: BTreeMap<String, PathSetConfig>,
    task: BTreeMap<String, TaskConfig>,
    watch: Vec<WatchBindingConfig>,
    server: ServerSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            paths: raw.paths,
            task: raw.task,
            watch: raw.watch,
            server: raw.server,
        }
    }

    pub fn settings(&self) -> &ConfigSection {
        &self.config
    }

    pub fn path_sets(&self) -> &BTreeMap<String, PathSetConfig> {
        &self.paths
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }

    pub fn watch_bindings(&self) -> &[WatchBindingConfig] {
        &self.watch
    }

    pub fn server(&self) -> &ServerSection {
        &self.server
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Quiet period for coalescing bursts of filesystem events.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum number of queued future runs.
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,

    /// `"queue"` (default) or `"latest"`.
    #[serde(default)]
    pub triggered_while_running: TriggerWhileRunningBehaviour,

    /// Directory deleted by `assetdag clean`.
    #[serde(default = "default_clean")]
    pub clean: String,
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_queue_length() -> usize {
    1
}

fn default_clean() -> String {
    "build".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            queue_length: default_queue_length(),
            triggered_while_running: TriggerWhileRunningBehaviour::default(),
            clean: default_clean(),
        }
    }
}

/// `[paths.<category>]`: where a category's sources live and where its
/// outputs go.
#[derive(Debug, Clone, Deserialize)]
pub struct PathSetConfig {
    /// Source glob patterns, e.g. `app/js/**/*.js`, or literal files.
    pub src: Vec<String>,

    /// Globs removed from the match set.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Base directory for includes (HTML templates, Sass load path).
    #[serde(default)]
    pub template: Option<String>,

    /// Output directory.
    pub dest: String,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Name of the path set this task builds. Tasks without one are groups.
    #[serde(default)]
    pub paths: Option<String>,

    /// Write chained `.map` files next to text outputs.
    #[serde(default)]
    pub sourcemaps: bool,

    /// Ordered transform steps.
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// One transform step, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepConfig {
    /// `@@include('file.html', {json})` + `@@var` substitution.
    Include {
        #[serde(default = "default_include_prefix")]
        prefix: String,
        /// `"@file"` for paths relative to the including file, otherwise a
        /// directory relative to the project root. Defaults to the path set's
        /// `template`.
        #[serde(default)]
        basepath: Option<String>,
        #[serde(default)]
        context: serde_json::Value,
    },
    /// Declaration-level vendor prefixes.
    Prefix {
        #[serde(default = "default_vendors")]
        vendors: Vec<String>,
    },
    /// SCSS compilation. Partials (`_name.scss`) are dropped from the output.
    Sass {
        #[serde(default)]
        load_paths: Vec<String>,
    },
    MinifyCss,
    MinifyJs,
    /// Lossless PNG recompression and JPEG re-encoding.
    Image {
        #[serde(default = "default_jpeg_quality")]
        jpeg_quality: u8,
    },
}

fn default_include_prefix() -> String {
    "@@".to_string()
}

fn default_vendors() -> Vec<String> {
    vec!["webkit".to_string(), "moz".to_string(), "ms".to_string()]
}

fn default_jpeg_quality() -> u8 {
    85
}

/// `[[watch]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchBindingConfig {
    pub pattern: String,
    pub tasks: Vec<String>,
    /// Ignore events whose file content did not change.
    #[serde(default)]
    pub use_hash: bool,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_root")]
    pub root: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Requested public tunnel; accepted but not supported.
    #[serde(default)]
    pub tunnel: bool,
    /// Label used in the startup banner and server log lines.
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Show a small banner in the browser on every reload.
    #[serde(default)]
    pub notify: bool,
}

fn default_server_root() -> String {
    "build".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9080
}

fn default_log_prefix() -> String {
    "assetdag".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            root: default_server_root(),
            host: default_host(),
            port: default_port(),
            tunnel: false,
            log_prefix: default_log_prefix(),
            notify: false,
        }
    }
}
