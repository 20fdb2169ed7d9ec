//! Single-hop reverse proxy over the overlay transport.
//!
//! # Responsibilities
//! - Strip the fixed routing prefix from the incoming path
//! - Rewrite the URI onto the backend target (path join, query merge)
//! - Drop hop-by-hop headers in both directions
//! - Dispatch once over the joined transport and relay the response as-is
//!
//! # Design Decisions
//! - No retries and no backpressure; backend errors pass through unmodified
//! - Only transport failures are mapped (502 Bad Gateway)
//! - Stateless: one instance serves every request of the process

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri},
    response::IntoResponse,
};
use std::net::SocketAddr;
use std::time::Instant;
use url::Url;

use crate::config::ForwarderConfig;
use crate::observability::metrics;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Headers meaningful only for a single transport-level connection.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Reverse proxy bound to one backend target.
#[derive(Debug, Clone)]
pub struct Forwarder {
    target: Url,
    transport: reqwest::Client,
    route_prefix: String,
    max_body_bytes: usize,
}

impl Forwarder {
    pub fn new(target: Url, transport: reqwest::Client, route_prefix: impl Into<String>) -> Self {
        Self {
            target,
            transport,
            route_prefix: route_prefix.into(),
            max_body_bytes: ForwarderConfig::default().max_body_bytes,
        }
    }

    /// Build a forwarder from the proxy section of the configuration.
    pub fn from_config(target: Url, transport: reqwest::Client, config: &ForwarderConfig) -> Self {
        Self::new(target, transport, config.route_prefix.clone()).with_max_body_bytes(config.max_body_bytes)
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn route_prefix(&self) -> &str {
        &self.route_prefix
    }

    /// Remove the routing prefix, on a segment boundary only.
    ///
    /// `/papercut/foo` → `/foo`, `/papercut` → `/`, `/papercutx` unchanged.
    pub fn strip_prefix<'a>(&self, path: &'a str) -> &'a str {
        if self.route_prefix.is_empty() {
            return path;
        }
        match path.strip_prefix(self.route_prefix.as_str()) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }

    /// Map an incoming URI onto the backend target.
    pub fn upstream_url(&self, uri: &Uri) -> Url {
        let mut url = self.target.clone();
        let path = self.strip_prefix(uri.path());
        url.set_path(&join_paths(self.target.path(), path));

        let query = match (self.target.query(), uri.query()) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Some(format!("{}&{}", a, b)),
            (Some(a), _) if !a.is_empty() => Some(a.to_string()),
            (_, Some(b)) if !b.is_empty() => Some(b.to_string()),
            _ => None,
        };
        url.set_query(query.as_deref());
        url
    }

    /// Forward one request and return the backend's response.
    pub async fn forward(&self, request: Request<Body>) -> Response<Body> {
        let start_time = Instant::now();
        let (parts, body) = request.into_parts();
        let url = self.upstream_url(&parts.uri);
        let method = parts.method.clone();

        tracing::debug!(
            method = %method,
            path = %parts.uri.path(),
            upstream = %url,
            "Forwarding request"
        );

        let body = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, limit = self.max_body_bytes, "Failed to read request body");
                metrics::record_request(StatusCode::PAYLOAD_TOO_LARGE.as_u16(), start_time);
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            }
        };

        let mut headers = parts.headers;
        let original_host = headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        strip_hop_by_hop(&mut headers);

        if let Some(host) = original_host {
            if !headers.contains_key(X_FORWARDED_HOST) {
                headers.insert(X_FORWARDED_HOST, host);
            }
        }
        if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut headers, peer.ip().to_string());
        }

        let upstream = self
            .transport
            .request(method.clone(), url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await;

        let upstream = match upstream {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(method = %method, upstream = %url, error = %e, "Upstream error");
                metrics::record_request(StatusCode::BAD_GATEWAY.as_u16(), start_time);
                return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
            }
        };

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let bytes = match upstream.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(upstream = %url, error = %e, "Failed to read upstream body");
                metrics::record_request(StatusCode::BAD_GATEWAY.as_u16(), start_time);
                return (StatusCode::BAD_GATEWAY, "Upstream response failed").into_response();
            }
        };

        metrics::record_request(status.as_u16(), start_time);

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        response
    }
}

/// Join the target path and the request path with exactly one slash.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers listed in `Connection` are hop-by-hop as well.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: String) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, client_ip),
        None => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
