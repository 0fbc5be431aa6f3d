// src/server/mod.rs

//! Development HTTP server with live reload.
//!
//! Serves a directory of built assets, injects a small polling client into
//! HTML pages and tells connected pages to refresh when builds finish.
//! Stylesheet-only changes are swapped in place; anything else reloads the
//! page.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

use crate::config::ServerSection;
use crate::errors::{AssetdagError, Result};
use crate::fs::{FileSystem, RealFileSystem};

pub mod files;
pub mod hub;

pub use hub::{Reload, ReloadHub, ReloadKind};

/// How long a poll request waits for a reload before answering `none`.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(25);

/// Settings for [`serve`].
#[derive(Debug, Clone)]
pub struct DevServerOptions {
    pub root: PathBuf,
    pub host: String,
    pub port: u16,
    pub tunnel: bool,
    pub log_prefix: String,
    pub notify: bool,
    pub poll_timeout: Duration,
}

impl DevServerOptions {
    pub fn new(root: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            root: root.into(),
            host: "localhost".to_string(),
            port,
            tunnel: false,
            log_prefix: "assetdag".to_string(),
            notify: false,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Options from the `[server]` section, with `root` resolved against
    /// the project directory.
    pub fn from_config(project_root: &Path, section: &ServerSection) -> Self {
        Self {
            root: project_root.join(&section.root),
            host: section.host.clone(),
            port: section.port,
            tunnel: section.tunnel,
            log_prefix: section.log_prefix.clone(),
            notify: section.notify,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// A running development server. Dropping it stops the server.
pub struct DevServer {
    server: Arc<Server>,
    hub: Arc<ReloadHub>,
    root: PathBuf,
    url: String,
    accept: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DevServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServer")
            .field("root", &self.root)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Start serving `opts.root` on `opts.host:opts.port`.
///
/// Fails with [`AssetdagError::PortInUse`] when the address is taken.
pub fn serve(opts: DevServerOptions) -> Result<DevServer> {
    serve_with(opts, Arc::new(RealFileSystem))
}

/// [`serve`] with an explicit filesystem.
pub fn serve_with(opts: DevServerOptions, fs: Arc<dyn FileSystem>) -> Result<DevServer> {
    let addr = format!("{}:{}", opts.host, opts.port);
    let server = Server::http(&addr).map_err(|err| {
        let in_use = err
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::AddrInUse);
        if in_use {
            AssetdagError::PortInUse {
                host: opts.host.clone(),
                port: opts.port,
            }
        } else {
            AssetdagError::Other(anyhow::anyhow!("failed to bind {addr}: {err}"))
        }
    })?;
    let server = Arc::new(server);

    let port = server
        .server_addr()
        .to_ip()
        .map(|a| a.port())
        .unwrap_or(opts.port);
    let url = format!("http://{}:{}", opts.host, port);

    if opts.tunnel {
        warn!("[{}] public tunnels are not supported; serving locally only", opts.log_prefix);
    }
    info!("[{}] serving {:?} at {}", opts.log_prefix, opts.root, url);

    let hub = Arc::new(ReloadHub::new());
    let ctx = Arc::new(RequestContext {
        fs,
        root: opts.root.clone(),
        hub: Arc::clone(&hub),
        notify: opts.notify,
        log_prefix: opts.log_prefix.clone(),
        poll_timeout: opts.poll_timeout,
    });

    let accept_server = Arc::clone(&server);
    let accept = thread::Builder::new()
        .name("assetdag-server".to_string())
        .spawn(move || {
            for req in accept_server.incoming_requests() {
                let ctx = Arc::clone(&ctx);
                // Poll requests block, so every request gets its own thread.
                if let Err(err) = thread::Builder::new()
                    .name("assetdag-request".to_string())
                    .spawn(move || handle(&ctx, req))
                {
                    warn!("failed to spawn request thread: {err}");
                }
            }
            debug!("server accept loop finished");
        })
        .map_err(AssetdagError::IoError)?;

    Ok(DevServer {
        server,
        hub,
        root: opts.root,
        url,
        accept: Some(accept),
    })
}

impl DevServer {
    /// Base URL, e.g. `http://localhost:9080`.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hub(&self) -> &Arc<ReloadHub> {
        &self.hub
    }

    /// Tell connected pages that `paths` changed.
    ///
    /// Stylesheets (and their maps) alone produce a `css` reload; any other
    /// path produces a full reload. An empty list sends nothing.
    pub fn notify_reload(&self, paths: &[PathBuf]) -> ReloadKind {
        let kind = classify(paths);
        if kind == ReloadKind::None {
            return kind;
        }
        let rel: Vec<String> = paths
            .iter()
            .map(|p| {
                p.strip_prefix(&self.root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        let seq = self.hub.notify(kind, rel);
        debug!(seq, ?kind, count = paths.len(), "reload sent");
        kind
    }

    /// Stop accepting requests and release waiting polls.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.hub.close();
        self.server.unblock();
        if let Some(handle) = self.accept.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DevServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reload kind for a set of changed output paths.
pub fn classify(paths: &[PathBuf]) -> ReloadKind {
    if paths.is_empty() {
        return ReloadKind::None;
    }
    let css_only = paths.iter().all(|p| {
        let name = p.to_string_lossy();
        name.ends_with(".css") || name.ends_with(".css.map")
    });
    if css_only {
        ReloadKind::Css
    } else {
        ReloadKind::Full
    }
}

#[derive(Debug)]
struct RequestContext {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    hub: Arc<ReloadHub>,
    notify: bool,
    log_prefix: String,
    poll_timeout: Duration,
}

fn handle(ctx: &RequestContext, req: Request) {
    if !matches!(req.method(), Method::Get | Method::Head) {
        let _ = req.respond(Response::empty(405));
        return;
    }

    let (path, query) = files::split_url(req.url());
    debug!(url = %req.url(), "[{}] request", ctx.log_prefix);

    let (status, content_type, body) = if path == files::POLL_PATH {
        poll(ctx, query)
    } else {
        static_file(ctx, &path)
    };

    let mut response = Response::from_data(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        response = response.with_header(header);
    }
    if let Ok(header) = Header::from_bytes(&b"Cache-Control"[..], &b"no-store"[..]) {
        response = response.with_header(header);
    }
    let _ = req.respond(response);
}

fn poll(ctx: &RequestContext, query: &str) -> (u16, &'static str, Vec<u8>) {
    let since = files::query_param(query, "since")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let reload = ctx.hub.wait_newer(since, ctx.poll_timeout);
    match serde_json::to_vec(&reload) {
        Ok(body) => (200, "application/json", body),
        Err(err) => (500, "text/plain; charset=utf-8", err.to_string().into_bytes()),
    }
}

fn static_file(ctx: &RequestContext, url_path: &str) -> (u16, &'static str, Vec<u8>) {
    let not_found = || (404, "text/plain; charset=utf-8", b"Not Found\n".to_vec());

    let Some(mut path) = files::resolve_path(&ctx.root, url_path) else {
        return (403, "text/plain; charset=utf-8", b"Forbidden\n".to_vec());
    };
    if ctx.fs.is_dir(&path) {
        path.push("index.html");
    }
    if !ctx.fs.is_file(&path) {
        return not_found();
    }

    let bytes = match ctx.fs.read(&path) {
        Ok(b) => b,
        Err(err) => {
            warn!("[{}] failed to read {:?}: {err:#}", ctx.log_prefix, path);
            return not_found();
        }
    };

    let content_type = files::content_type(&path);
    if content_type.starts_with("text/html") {
        let html = String::from_utf8_lossy(&bytes);
        let script = files::client_script(ctx.hub.current_seq(), ctx.notify, &ctx.log_prefix);
        return (200, content_type, files::inject_client(&html, &script).into_bytes());
    }
    (200, content_type, bytes)
}
