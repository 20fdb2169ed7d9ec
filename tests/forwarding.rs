//! End-to-end forwarding through the proxy server.

use axum::http::StatusCode;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

use overlay_bridge::config::ForwarderConfig;
use overlay_bridge::proxy::{Forwarder, GatewayRequest, ProxyServer};

mod common;

async fn start_proxy(target: Url) -> SocketAddr {
    let config = ForwarderConfig::default();
    let forwarder = Arc::new(Forwarder::from_config(target, common::direct_client(), &config));
    let server = ProxyServer::new(forwarder, &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener, std::future::pending()).await;
    });
    addr
}

#[tokio::test]
async fn test_prefix_is_stripped_before_forwarding() {
    let backend = common::start_echo_backend().await;
    let proxy = start_proxy(Url::parse(&format!("http://{}", backend)).unwrap()).await;

    let res = common::direct_client()
        .post(format!("http://{}/papercut/foo/bar?page=2", proxy))
        .body("job=1")
        .send()
        .await
        .expect("proxy unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-backend"], "echo");
    assert!(res.headers().contains_key("x-request-id"));

    let echoed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["path"], "/foo/bar");
    assert_eq!(echoed["query"], "page=2");
    assert_eq!(echoed["body"], "job=1");
    assert_eq!(echoed["forwardedHost"], proxy.to_string());
}

#[tokio::test]
async fn test_target_path_is_preserved() {
    let backend = common::start_echo_backend().await;
    let proxy = start_proxy(Url::parse(&format!("http://{}/app/", backend)).unwrap()).await;

    let res = common::direct_client()
        .get(format!("http://{}/papercut/rpc/api", proxy))
        .send()
        .await
        .unwrap();

    let echoed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(echoed["path"], "/app/rpc/api");
}

#[tokio::test]
async fn test_backend_status_passes_through() {
    let backend = common::start_echo_backend().await;
    let proxy = start_proxy(Url::parse(&format!("http://{}", backend)).unwrap()).await;

    let res = common::direct_client()
        .get(format!("http://{}/papercut/health", proxy))
        .header("x-respond-with", "503")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let echoed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(echoed["path"], "/health");
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    // Bind then drop to get a port nothing listens on.
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let proxy = start_proxy(Url::parse(&format!("http://{}", closed)).unwrap()).await;

    let res = common::direct_client()
        .get(format!("http://{}/papercut/", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_gateway_event_is_forwarded() {
    let backend = common::start_echo_backend().await;
    let forwarder = Forwarder::new(
        Url::parse(&format!("http://{}", backend)).unwrap(),
        common::direct_client(),
        "/papercut",
    );

    let event = GatewayRequest {
        http_method: "GET".into(),
        path: "/papercut/status".into(),
        headers: Some(HashMap::from([("Host".to_string(), "edge.example.com".to_string())])),
        query_string_parameters: Some(HashMap::from([("verbose".to_string(), "1".to_string())])),
        ..Default::default()
    };

    let response = forwarder.handle_event(event).await.unwrap();

    assert_eq!(response.status_code, 200);
    assert!(!response.is_base64_encoded);
    let echoed: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(echoed["path"], "/status");
    assert_eq!(echoed["query"], "verbose=1");
    assert_eq!(echoed["forwardedHost"], "edge.example.com");
}
