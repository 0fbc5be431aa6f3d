// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod project;
pub mod registry;
pub mod server;
pub mod transforms;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, config_root_dir, load_and_validate};
use crate::engine::{RunSummary, RuntimeEvent, RuntimeOptions};
use crate::errors::AssetdagError;
use crate::fs::{FileSystem, RealFileSystem};
use crate::pipeline::{BUILD_EVENT_CAPACITY, BuildEvent};
use crate::project::Project;
use crate::registry::{EVENT_CHANNEL_CAPACITY, SessionOptions, TaskRegistry};
use crate::server::{DevServer, DevServerOptions};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the task registry built from the config
/// - one-shot runs (`build`, `run`, `clean`)
/// - the watcher, the dev server and Ctrl-C handling for long-lived modes
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let root = config_root_dir(&config_path);
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let project = Project::new(cfg, root, fs);

    if args.dry_run {
        let registry = project.registry(None)?;
        print_dry_run(&project.config, &registry);
        return Ok(());
    }

    match args.command() {
        Command::Build => {
            let registry = project.registry(None)?;
            let summary = registry.run_many(&project.build_targets()).await?;
            ensure_success(summary)
        }
        Command::Run { task } => {
            let registry = project.registry(None)?;
            let summary = registry.run(&task).await?;
            ensure_success(summary)
        }
        Command::Clean => clean(&project),
        Command::Watch => {
            let registry = project.registry(None)?;
            watch(&project, &registry, Vec::new()).await
        }
        Command::Default => serve_and_watch(&project).await,
    }
}

fn ensure_success(summary: RunSummary) -> Result<()> {
    if summary.is_success() {
        Ok(())
    } else {
        Err(AssetdagError::TasksFailed(summary.unsuccessful()).into())
    }
}

fn clean(project: &Project) -> Result<()> {
    let dir = project.clean_dir();
    if project.root().starts_with(&dir) {
        return Err(AssetdagError::ConfigError(format!(
            "refusing to clean {dir:?}: it contains the project root"
        ))
        .into());
    }
    if project.fs.exists(&dir) {
        project.fs.remove_dir_all(&dir)?;
        info!("removed {:?}", dir);
    } else {
        debug!("nothing to clean at {:?}", dir);
    }
    Ok(())
}

/// Watch until Ctrl-C. `initial` targets run first.
async fn watch(project: &Project, registry: &TaskRegistry, initial: Vec<String>) -> Result<()> {
    let settings = project.config.settings();
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(EVENT_CHANNEL_CAPACITY);

    let dispatcher = project.dispatcher()?;
    let _watcher = watch::spawn_watcher(
        dispatcher,
        Arc::clone(&project.fs),
        rt_tx.clone(),
        Duration::from_millis(settings.debounce_ms),
    )?;

    // Ctrl-C -> graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let summary = registry
        .drive(
            initial,
            rt_tx,
            rt_rx,
            RuntimeOptions {
                exit_when_idle: false,
            },
            SessionOptions {
                behaviour: settings.triggered_while_running,
                queue_length: settings.queue_length,
            },
        )
        .await?;
    debug!(?summary, "watch session ended");
    Ok(())
}

/// Default command: build once, serve the output and rebuild on change.
async fn serve_and_watch(project: &Project) -> Result<()> {
    let (events_tx, events_rx) = broadcast::channel::<BuildEvent>(BUILD_EVENT_CAPACITY);
    let registry = project.registry(Some(events_tx))?;

    let summary = registry.run_many(&project.build_targets()).await?;
    if !summary.is_success() {
        warn!(failed = ?summary.unsuccessful(), "initial build had failures; serving anyway");
    }

    let opts = DevServerOptions::from_config(project.root(), project.config.server());
    let server = Arc::new(server::serve(opts)?);
    let forwarder = tokio::spawn(forward_reloads(Arc::clone(&server), events_rx));

    let result = watch(project, &registry, Vec::new()).await;
    forwarder.abort();
    result
}

async fn forward_reloads(server: Arc<DevServer>, mut events: broadcast::Receiver<BuildEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let kind = server.notify_reload(&event.outputs);
                debug!(task = %event.task, ?kind, "build finished; reload sent");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "reload forwarder lagged; forcing a full reload");
                server.notify_reload(&[PathBuf::from("index.html")]);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Simple dry-run output: path sets, tasks with their plans, bindings and
/// server settings.
fn print_dry_run(cfg: &ConfigFile, registry: &TaskRegistry) {
    println!("assetdag dry-run");
    println!("  config.debounce_ms = {}", cfg.settings().debounce_ms);
    println!(
        "  config.triggered_while_running = {:?}",
        cfg.settings().triggered_while_running
    );
    println!("  config.queue_length = {}", cfg.settings().queue_length);
    println!("  config.clean = {}", cfg.settings().clean);
    println!();

    println!("paths ({}):", cfg.path_sets().len());
    for (name, set) in cfg.path_sets().iter() {
        println!("  - {name}");
        println!("      src: {:?}", set.src);
        if !set.exclude.is_empty() {
            println!("      exclude: {:?}", set.exclude);
        }
        if let Some(ref template) = set.template {
            println!("      template: {template}");
        }
        println!("      dest: {}", set.dest);
    }
    println!();

    println!("tasks ({}):", registry.len());
    for name in registry.names() {
        println!("  - {name}");
        if let Some(task) = cfg.tasks().get(name) {
            if !task.after.is_empty() {
                println!("      after: {:?}", task.after);
            }
            if let Some(ref paths) = task.paths {
                println!("      paths: {paths}");
            }
            if !task.steps.is_empty() {
                println!("      steps: {:?}", task.steps);
            }
            if task.sourcemaps {
                println!("      sourcemaps: true");
            }
        }
        match registry.plan(name) {
            Ok(plan) => println!("      plan: {}", plan.join(" -> ")),
            Err(err) => println!("      plan: error: {err}"),
        }
    }
    println!();

    println!("watch ({}):", cfg.watch_bindings().len());
    for binding in cfg.watch_bindings() {
        let hash = if binding.use_hash { " (use_hash)" } else { "" };
        println!("  - {} -> {:?}{hash}", binding.pattern, binding.tasks);
    }
    println!();

    let server = cfg.server();
    println!(
        "server: http://{}:{} serving {}",
        server.host, server.port, server.root
    );

    debug!("dry-run complete (no execution)");
}
