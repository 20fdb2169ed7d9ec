//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files, and
//! every section falls back to defaults matching the serverless deployment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the overlay bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Remote configuration store parameter names.
    pub parameters: ParameterConfig,

    /// Overlay network management API (token endpoint, keys, devices).
    pub control_plane: ControlPlaneConfig,

    /// Local overlay node settings.
    pub overlay: OverlayConfig,

    /// Request forwarding settings.
    pub proxy: ForwarderConfig,

    /// Shutdown behaviour.
    pub lifecycle: LifecycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Parameter store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ParameterConfig {
    /// Parameter holding the backend target URL.
    pub target_parameter: String,

    /// Parameter holding the OAuth client JSON (`{"id": ..., "key": ...}`).
    /// Always read with decryption.
    pub oauth_client_parameter: String,

    /// Port of the parameters extension when the environment does not name one.
    pub extension_port: u16,

    /// Per-fetch timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            target_parameter: "/papercut/server/url".to_string(),
            oauth_client_parameter: "/tailscale/oauth-client".to_string(),
            extension_port: 2773,
            timeout_ms: 5_000,
        }
    }
}

/// Overlay network management API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Base URL of the management API (token endpoint lives underneath).
    pub base_url: String,

    /// Tag applied to every device joined with a minted credential.
    pub device_tag: String,

    /// Lifetime of a minted join credential in seconds.
    pub key_ttl_secs: u64,

    /// Timeout for each management API request in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tailscale.com".to_string(),
            device_tag: "tag:printworks".to_string(),
            key_ttl_secs: 30 * 60,
            request_timeout_ms: 10_000,
        }
    }
}

impl ControlPlaneConfig {
    pub fn key_ttl(&self) -> Duration {
        Duration::from_secs(self.key_ttl_secs)
    }
}

/// Local overlay node configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Path to the overlay daemon binary.
    pub daemon_binary: String,

    /// Path to the overlay CLI binary.
    pub cli_binary: String,

    /// Writable state directory for the node.
    pub state_dir: String,

    /// Prefix for generated hostnames (a random suffix is appended).
    pub hostname_prefix: String,

    /// Loopback port for the node's SOCKS5 proxy.
    pub socks5_port: u16,

    /// Upper bound on the whole join sequence in seconds.
    pub join_timeout_secs: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            daemon_binary: "tailscaled".to_string(),
            cli_binary: "tailscale".to_string(),
            state_dir: "/tmp/tailscale".to_string(),
            hostname_prefix: "printworks-".to_string(),
            socks5_port: 1055,
            join_timeout_secs: 10,
        }
    }
}

impl OverlayConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

/// Request forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Leading path segment stripped before forwarding.
    pub route_prefix: String,

    /// Bind address for the local HTTP surface.
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Largest request body accepted for forwarding, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            route_prefix: "/papercut".to_string(),
            bind_address: "127.0.0.1:8080".to_string(),
            request_timeout_secs: 30,
            // API Gateway payload ceiling
            max_body_bytes: 6 * 1024 * 1024,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Shared deadline for all teardown actions, in milliseconds.
    /// The host caps its shutdown phase at 2 seconds.
    pub cleanup_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cleanup_timeout_ms: 1_800,
        }
    }
}

impl LifecycleConfig {
    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
