// src/server/files.rs

//! Static file lookup and the live-reload client script.

use std::path::{Component, Path, PathBuf};

/// Endpoint polled by the injected client script.
pub const POLL_PATH: &str = "/__assetdag/poll";

/// `Content-Type` for a file, by extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        _ => "application/octet-stream",
    }
}

/// Split a request URL into its decoded path and its query string.
pub fn split_url(url: &str) -> (String, &str) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    (percent_decode(path), query)
}

/// Value of `key` in a query string.
pub fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Map a decoded URL path to a location below `root`.
///
/// Returns `None` for paths that try to leave the root. Directory paths get
/// `index.html` appended by the caller once it knows they are directories.
pub fn resolve_path(root: &Path, url_path: &str) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    for component in Path::new(url_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

/// Insert the live-reload script before the last `</body>` (any case), or
/// append it when the page has no body end tag.
pub fn inject_client(html: &str, script: &str) -> String {
    let tag = format!("<script>{script}</script>");
    // ASCII lowercasing keeps byte offsets, so `i` indexes `html` too.
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(i) => format!("{}{}{}", &html[..i], tag, &html[i..]),
        None => format!("{html}{tag}"),
    }
}

/// Client script: long-polls for reloads, swaps stylesheets for `css`
/// reloads and reloads the page otherwise.
pub fn client_script(seq: u64, notify: bool, label: &str) -> String {
    let label = serde_json::to_string(label).unwrap_or_else(|_| "\"assetdag\"".to_string());
    CLIENT_TEMPLATE
        .replace("__SEQ__", &seq.to_string())
        .replace("__NOTIFY__", if notify { "true" } else { "false" })
        .replace("__LABEL__", &label)
        .replace("__POLL__", POLL_PATH)
}

const CLIENT_TEMPLATE: &str = r#"(function () {
  var seq = __SEQ__, notify = __NOTIFY__, label = __LABEL__;
  function banner(text) {
    if (!notify || !document.body) return;
    var el = document.createElement('div');
    el.textContent = label + ': ' + text;
    el.style.cssText = 'position:fixed;top:0;right:0;z-index:2147483647;padding:4px 10px;background:#1b1b1b;color:#fff;font:12px sans-serif';
    document.body.appendChild(el);
    setTimeout(function () { el.parentNode && el.parentNode.removeChild(el); }, 1500);
  }
  function swapCss() {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    for (var i = 0; i < links.length; i++) {
      var href = links[i].getAttribute('href').replace(/([?&])assetdag=\d+&?/, '$1').replace(/[?&]$/, '');
      links[i].setAttribute('href', href + (href.indexOf('?') < 0 ? '?' : '&') + 'assetdag=' + seq);
    }
  }
  function poll() {
    fetch('__POLL__?since=' + seq, { cache: 'no-store' })
      .then(function (r) { return r.json(); })
      .then(function (msg) {
        seq = msg.seq;
        if (msg.kind === 'css') { swapCss(); banner('styles updated'); }
        else if (msg.kind === 'full') { banner('reloading'); location.reload(); return; }
        poll();
      })
      .catch(function () { setTimeout(poll, 1000); });
  }
  poll();
})();"#;
