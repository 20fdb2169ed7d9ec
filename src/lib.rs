//! Overlay Bridge Library
//!
//! Exposes an internal HTTP backend through a private overlay network from a
//! short-lived serverless instance: join on cold start, forward requests,
//! reclaim the network identity on shutdown.

pub mod config;
pub mod credentials;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod overlay;
pub mod params;
pub mod proxy;

pub use config::BridgeConfig;
pub use error::{CleanupError, StartupError};
pub use lifecycle::{CleanupCoordinator, LifecycleState, Startup};
pub use proxy::{Forwarder, ProxyServer};
