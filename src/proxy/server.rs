//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router sending every path to the forwarder
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener with graceful shutdown

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    response::Response,
    routing::any,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ForwarderConfig;
use crate::proxy::forwarder::Forwarder;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// HTTP surface in front of the forwarder.
pub struct ProxyServer {
    router: Router,
}

impl ProxyServer {
    /// Create a new HTTP server around a published forwarder.
    pub fn new(forwarder: Arc<Forwarder>, config: &ForwarderConfig) -> Self {
        Self {
            router: Self::build_router(forwarder, config),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(forwarder: Arc<Forwarder>, config: &ForwarderConfig) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(forwarder)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Every request goes to the single backend.
async fn proxy_handler(State(forwarder): State<Arc<Forwarder>>, request: Request<Body>) -> Response {
    forwarder.forward(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_unreachable_backend_is_bad_gateway() {
        // Nothing listens on port 9 of the loopback interface.
        let forwarder = Arc::new(Forwarder::new(
            "http://127.0.0.1:9".parse().unwrap(),
            reqwest::Client::builder().no_proxy().build().unwrap(),
            "/papercut",
        ));
        let server = ProxyServer::new(forwarder, &ForwarderConfig::default());

        let response = server
            .router()
            .oneshot(Request::get("/papercut/foo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }
}
