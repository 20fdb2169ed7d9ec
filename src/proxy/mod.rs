//! Request forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request / gateway event
//!     → server.rs (Axum, request ID, timeout, trace) or gateway.rs (event → request)
//!     → forwarder.rs (strip prefix, rewrite URI, drop hop-by-hop headers)
//!     → overlay transport (one hop to the backend)
//!     → response relayed unmodified
//! ```

pub mod forwarder;
pub mod gateway;
pub mod server;

pub use forwarder::Forwarder;
pub use gateway::{GatewayError, GatewayRequest, GatewayResponse};
pub use server::{ProxyServer, X_REQUEST_ID};
