//! Shared mocks and fakes for integration testing.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use overlay_bridge::config::BridgeConfig;
use overlay_bridge::credentials::JoinCredential;
use overlay_bridge::overlay::{JoinedNode, NetworkIdentity, NodeError, OverlayNetwork, OverlayNode};
use overlay_bridge::params::{ParameterError, ParameterStore};

pub const TARGET_PARAM: &str = "/papercut/server/url";
pub const OAUTH_PARAM: &str = "/tailscale/oauth-client";

/// Serve `router` on an ephemeral loopback port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    addr
}

/// Client that never routes through an environment proxy.
pub fn direct_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Default configuration pointed at a mock control plane.
pub fn test_config(control_plane: SocketAddr) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.control_plane.base_url = format!("http://{}", control_plane);
    config
}

pub fn ip(addr: &str) -> IpAddr {
    addr.parse().unwrap()
}

pub fn own_identity() -> NetworkIdentity {
    NetworkIdentity::new("nOwn1CNTRL", vec![ip("100.64.0.7"), ip("fd7a:115c:a1e0::7")])
}

pub fn join_credential() -> JoinCredential {
    JoinCredential {
        secret: "join-secret".into(),
        id: "cred-1".into(),
        expires: None,
        device_tag: "tag:printworks".into(),
        reusable: false,
        ephemeral: true,
    }
}

// ============================================================================
// Control plane
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

/// Artificial latency per management API call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Delays {
    pub key_create: Duration,
    pub key_delete: Duration,
    pub device_delete: Duration,
}

struct ControlPlaneInner {
    token_status: StatusCode,
    devices: Vec<Value>,
    delays: Delays,
    calls: Mutex<Vec<RecordedCall>>,
}

/// In-process stand-in for the token endpoint and the management API.
#[derive(Clone)]
pub struct MockControlPlane {
    inner: Arc<ControlPlaneInner>,
}

impl MockControlPlane {
    pub fn new(devices: Vec<Value>) -> Self {
        Self::build(StatusCode::OK, devices, Delays::default())
    }

    pub fn rejecting_token(status: StatusCode) -> Self {
        Self::build(status, Vec::new(), Delays::default())
    }

    pub fn with_delays(devices: Vec<Value>, delays: Delays) -> Self {
        Self::build(StatusCode::OK, devices, delays)
    }

    fn build(token_status: StatusCode, devices: Vec<Value>, delays: Delays) -> Self {
        Self {
            inner: Arc::new(ControlPlaneInner {
                token_status,
                devices,
                delays,
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    pub async fn start(&self) -> SocketAddr {
        let router = Router::new()
            .fallback(control_plane_handler)
            .with_state(self.inner.clone());
        spawn_server(router).await
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: Method, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }
}

pub fn device(id: &str, node_id: &str, hostname: &str, addresses: &[&str]) -> Value {
    json!({
        "id": id,
        "nodeId": node_id,
        "hostname": hostname,
        "addresses": addresses,
    })
}

async fn control_plane_handler(
    State(inner): State<Arc<ControlPlaneInner>>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, 1024 * 1024).await.unwrap_or_default();
    let path = parts.uri.path().to_string();

    inner.calls.lock().unwrap().push(RecordedCall {
        method: parts.method.clone(),
        path: path.clone(),
        authorization: parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    match (parts.method, path.as_str()) {
        (Method::POST, "/api/v2/oauth/token") => {
            if inner.token_status == StatusCode::OK {
                Json(json!({ "access_token": "tok", "token_type": "Bearer" })).into_response()
            } else {
                (inner.token_status, "invalid client").into_response()
            }
        }
        (Method::POST, "/api/v2/tailnet/-/keys") => {
            tokio::time::sleep(inner.delays.key_create).await;
            Json(json!({
                "id": "cred-1",
                "key": "join-secret",
                "expires": "2026-10-19T12:30:00Z",
            }))
            .into_response()
        }
        (Method::GET, "/api/v2/tailnet/-/devices") => {
            Json(json!({ "devices": inner.devices })).into_response()
        }
        (Method::DELETE, p) if p.starts_with("/api/v2/device/") => {
            tokio::time::sleep(inner.delays.device_delete).await;
            StatusCode::OK.into_response()
        }
        (Method::DELETE, p) if p.starts_with("/api/v2/tailnet/-/keys/") => {
            tokio::time::sleep(inner.delays.key_delete).await;
            StatusCode::OK.into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

// ============================================================================
// Parameter store
// ============================================================================

pub struct MapStore {
    values: HashMap<String, String>,
    pub calls: Mutex<Vec<(String, bool)>>,
}

impl MapStore {
    pub fn new(values: &[(&str, &str)]) -> Self {
        Self {
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Both bootstrap parameters, with the target pointed at `target`.
    pub fn bootstrap(target: &str) -> Self {
        Self::new(&[
            (TARGET_PARAM, target),
            (OAUTH_PARAM, r#"{"id":"c1","key":"k1"}"#),
        ])
    }
}

#[async_trait]
impl ParameterStore for MapStore {
    async fn fetch(&self, name: &str, decrypt: bool) -> Result<String, ParameterError> {
        self.calls.lock().unwrap().push((name.to_string(), decrypt));
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ParameterError::NotFound(name.to_string()))
    }
}

// ============================================================================
// Overlay network
// ============================================================================

#[derive(Default)]
pub struct FakeNode {
    close_delay: Duration,
    closes: AtomicUsize,
}

impl FakeNode {
    /// Node whose close takes `delay` to complete.
    pub fn slow(delay: Duration) -> Self {
        Self {
            close_delay: delay,
            closes: AtomicUsize::new(0),
        }
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OverlayNode for FakeNode {
    async fn close(&self) -> Result<(), NodeError> {
        tokio::time::sleep(self.close_delay).await;
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Joins instantly with a fixed identity, or always fails.
pub struct FakeNetwork {
    identity: NetworkIdentity,
    fail: bool,
    pub node: Arc<FakeNode>,
    /// `(secret, hostname)` of every join attempt.
    pub joins: Mutex<Vec<(String, String)>>,
}

impl FakeNetwork {
    pub fn new(identity: NetworkIdentity) -> Self {
        Self {
            identity,
            fail: false,
            node: Arc::new(FakeNode::default()),
            joins: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(own_identity())
        }
    }

    pub fn join_count(&self) -> usize {
        self.joins.lock().unwrap().len()
    }
}

#[async_trait]
impl OverlayNetwork for FakeNetwork {
    async fn join(&self, credential: &JoinCredential, hostname: &str) -> Result<JoinedNode, NodeError> {
        self.joins
            .lock()
            .unwrap()
            .push((credential.secret.clone(), hostname.to_string()));

        if self.fail {
            return Err(NodeError::Timeout(Duration::from_secs(10)));
        }
        Ok(JoinedNode {
            node: self.node.clone(),
            transport: direct_client(),
            identity: self.identity.clone(),
        })
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Echo backend: replies with the method, path and query it received, and
/// honours an `x-respond-with` status header.
pub async fn start_echo_backend() -> SocketAddr {
    async fn echo(request: Request<Body>) -> Response {
        let status = request
            .headers()
            .get("x-respond-with")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u16>().ok())
            .and_then(|v| StatusCode::from_u16(v).ok())
            .unwrap_or(StatusCode::OK);

        let forwarded_host = request
            .headers()
            .get("x-forwarded-host")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        let query = request.uri().query().map(str::to_string);
        let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
            .await
            .unwrap_or_default();

        (
            status,
            [("x-backend", "echo")],
            Json(json!({
                "method": method,
                "path": path,
                "query": query,
                "forwardedHost": forwarded_host,
                "body": String::from_utf8_lossy(&body),
            })),
        )
            .into_response()
    }

    spawn_server(Router::new().fallback(echo)).await
}
