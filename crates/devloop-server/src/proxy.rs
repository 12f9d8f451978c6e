//! Upstream fallback for missing files.
//!
//! When a proxy origin is configured, requests for paths that do not exist
//! below the watch root are fetched from that origin and relayed unchanged.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use ureq::Agent;

/// Upstream request timeout in seconds.
const DEFAULT_TIMEOUT: u64 = 30;

/// Largest upstream body relayed to the browser.
const MAX_BODY: u64 = 64 * 1024 * 1024;

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Client for the configured upstream origin.
pub(crate) struct Proxy {
    agent: Agent,
    origin: String,
}

impl Proxy {
    pub(crate) fn new(origin: &str) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT)))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            origin: origin.trim_end_matches('/').to_owned(),
        }
    }

    pub(crate) fn origin(&self) -> &str {
        &self.origin
    }

    /// Only safe reads are forwarded; request bodies are never relayed.
    pub(crate) fn accepts(method: &Method) -> bool {
        method == Method::GET || method == Method::HEAD
    }

    /// Upstream URL for a request URI, keeping the query string.
    fn url_for(&self, uri: &Uri) -> String {
        let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!("{}{path}", self.origin)
    }

    /// Fetch `uri` from the upstream origin and relay the response.
    ///
    /// Upstream failures become `502 Bad Gateway`.
    pub(crate) async fn forward(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Response {
        let url = self.url_for(uri);
        let head = method == Method::HEAD;
        let request_headers = relayed_request_headers(headers);
        let agent = self.agent.clone();
        let target = url.clone();

        let fetched = tokio::task::spawn_blocking(move || {
            let mut request = if head {
                agent.head(&target)
            } else {
                agent.get(&target)
            };
            for (name, value) in &request_headers {
                request = request.header(name.as_str(), value.as_bytes());
            }

            let response = request.call()?;
            let (parts, mut body) = response.into_parts();
            let bytes = if head {
                Vec::new()
            } else {
                body.with_config().limit(MAX_BODY).read_to_vec()?
            };
            Ok::<_, ureq::Error>((parts.status.as_u16(), parts.headers, bytes))
        })
        .await;

        match fetched {
            Ok(Ok((status, upstream_headers, bytes))) => {
                tracing::debug!(url = %url, status, "Proxied missing file");
                relay(status, &upstream_headers, bytes)
            }
            Ok(Err(e)) => bad_gateway(&url, &e),
            Err(e) => bad_gateway(&url, &e),
        }
    }
}

fn is_relayed(name: &str) -> bool {
    !HOP_BY_HOP.contains(&name)
}

/// Request headers sent upstream.
///
/// `Host` comes from the upstream URL. `Accept-Encoding` is left to the
/// client so bodies arrive decoded.
fn relayed_request_headers(headers: &HeaderMap) -> Vec<(HeaderName, HeaderValue)> {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            is_relayed(name) && name != "host" && name != "accept-encoding" && name != "content-length"
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn relay(status: u16, upstream: &ureq::http::HeaderMap, bytes: Vec<u8>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, Body::from(bytes)).into_response();

    let headers = response.headers_mut();
    for (name, value) in upstream {
        let name = name.as_str();
        // Length and encoding describe the upstream body, not the decoded copy
        if !is_relayed(name) || name == "content-length" || name == "content-encoding" {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }
    response
}

fn bad_gateway(url: &str, error: &dyn std::fmt::Display) -> Response {
    tracing::warn!(url = %url, error = %error, "Proxy request failed");
    (
        StatusCode::BAD_GATEWAY,
        format!("Proxy request to {url} failed: {error}"),
    )
        .into_response()
}
