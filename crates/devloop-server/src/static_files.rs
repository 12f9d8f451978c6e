//! Static file serving.
//!
//! Serves the watched tree with the live reload client injected into every
//! HTML page. While the last build is failed, HTML requests get the build
//! failure page instead.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Response};
use percent_encoding::percent_decode_str;

use crate::live_reload::{BuildOutcome, is_boss_address};
use crate::proxy::Proxy;
use crate::state::AppState;

/// Route of the browser client script.
pub(crate) const CLIENT_PATH: &str = "/__devloop/client.js";

const CLIENT_JS: &str = include_str!("../assets/client.js");

const SCRIPT_TAG: &str = "<script src=\"/__devloop/client.js\"></script>\n";

/// Serve the browser client.
pub(crate) async fn client_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        CLIENT_JS,
    )
}

/// Serve a file from the watch root.
///
/// Missing files are fetched from the proxy origin when one is configured.
pub(crate) async fn serve_file(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let Some(relative) = sanitize(uri.path()) else {
        return (StatusCode::BAD_REQUEST, "Bad request").into_response();
    };

    let mut path = state.root.join(&relative);
    if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
        path.push("index.html");
    }

    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return match &state.proxy {
                Some(proxy) if Proxy::accepts(&method) => {
                    proxy.forward(&method, &uri, &headers).await
                }
                _ => not_found(&uri),
            };
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read file");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response();
        }
    };

    if !is_html(&path) {
        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        return ([(header::CONTENT_TYPE, mime.as_ref())], Body::from(content)).into_response();
    }

    if is_boss_address(addr.ip(), &state.boss_address) {
        state.coordinator.page_visited(uri.path().to_owned());
    }

    if state.coordinator.is_build_failed() {
        let page = failure_page(&state.coordinator.build_outcome());
        return (StatusCode::INTERNAL_SERVER_ERROR, Html(page)).into_response();
    }

    Html(inject_client(&String::from_utf8_lossy(&content))).into_response()
}

/// Decode a request path into a root-relative path.
///
/// Returns `None` for paths that try to leave the root.
fn sanitize(uri_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(uri_path).decode_utf8().ok()?;
    let mut relative = PathBuf::new();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(relative)
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
}

fn not_found(uri: &Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("Cannot find {}", uri.path()),
    )
        .into_response()
}

/// Insert the client script before the last `</body>`, or append it.
pub(crate) fn inject_client(html: &str) -> String {
    let mut result = String::with_capacity(html.len() + SCRIPT_TAG.len());
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(index) => {
            result.push_str(&html[..index]);
            result.push_str(SCRIPT_TAG);
            result.push_str(&html[index..]);
        }
        None => {
            result.push_str(html);
            result.push_str(SCRIPT_TAG);
        }
    }
    result
}

/// Render the build failure page.
fn failure_page(outcome: &BuildOutcome) -> String {
    let BuildOutcome::Failed {
        output,
        exit_code,
        finished_at,
    } = outcome
    else {
        return String::new();
    };

    let status = exit_code.map_or_else(
        || "could not run".to_owned(),
        |code| format!("exit code {code}"),
    );

    let page = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Build failed</title>\n\
         <style>body{{font-family:sans-serif;margin:2em}}pre{{background:#fee;padding:1em;\
         white-space:pre-wrap}}</style>\n</head>\n<body>\n<h1>Build failed</h1>\n\
         <p>Finished {} ({})</p>\n<pre>{}</pre>\n</body>\n</html>\n",
        finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        escape_html(&status),
        escape_html(output),
    );
    inject_client(&page)
}

/// Escape HTML special characters.
fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}
