//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, TTL bounded, ports valid)
//! - Check that URLs and addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::time::Duration;

use crate::config::schema::BridgeConfig;

/// Hard ceiling the host places on its shutdown phase.
pub const HOST_SHUTDOWN_CEILING: Duration = Duration::from_secs(2);

/// Longest lifetime a join credential may have. One invocation plus the
/// shutdown grace window fits well inside it.
pub const MAX_KEY_TTL_SECS: u64 = 60 * 60;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.parameters.target_parameter.trim().is_empty() {
        errors.push(ValidationError::new("parameters.target_parameter", "must not be empty"));
    }
    if config.parameters.oauth_client_parameter.trim().is_empty() {
        errors.push(ValidationError::new(
            "parameters.oauth_client_parameter",
            "must not be empty",
        ));
    }
    if config.parameters.extension_port == 0 {
        errors.push(ValidationError::new("parameters.extension_port", "must be non-zero"));
    }
    if config.parameters.timeout_ms == 0 {
        errors.push(ValidationError::new("parameters.timeout_ms", "must be greater than 0"));
    }

    match url::Url::parse(&config.control_plane.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "control_plane.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            "control_plane.base_url",
            format!("invalid URL: {}", e),
        )),
    }
    if !config.control_plane.device_tag.starts_with("tag:") {
        errors.push(ValidationError::new(
            "control_plane.device_tag",
            "must start with 'tag:'",
        ));
    }
    // The credential must outlive the join plus the cleanup that revokes it.
    let min_ttl_secs = config
        .overlay
        .join_timeout_secs
        .saturating_add(config.lifecycle.cleanup_timeout().as_secs_f64().ceil() as u64);
    let ttl_secs = config.control_plane.key_ttl_secs;
    if ttl_secs < min_ttl_secs || ttl_secs > MAX_KEY_TTL_SECS {
        errors.push(ValidationError::new(
            "control_plane.key_ttl_secs",
            format!("must be between {} and {} seconds", min_ttl_secs, MAX_KEY_TTL_SECS),
        ));
    }
    if config.control_plane.request_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "control_plane.request_timeout_ms",
            "must be greater than 0",
        ));
    }

    if config.overlay.state_dir.trim().is_empty() {
        errors.push(ValidationError::new("overlay.state_dir", "must not be empty"));
    }
    if config.overlay.socks5_port == 0 {
        errors.push(ValidationError::new("overlay.socks5_port", "must be non-zero"));
    }
    if config.overlay.join_timeout_secs == 0 {
        errors.push(ValidationError::new("overlay.join_timeout_secs", "must be greater than 0"));
    }

    if !config.proxy.route_prefix.is_empty()
        && (!config.proxy.route_prefix.starts_with('/') || config.proxy.route_prefix.ends_with('/'))
    {
        errors.push(ValidationError::new(
            "proxy.route_prefix",
            "must start with '/' and must not end with '/'",
        ));
    }
    if config.proxy.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "proxy.bind_address",
            format!("'{}' is not a socket address", config.proxy.bind_address),
        ));
    }
    if config.proxy.request_timeout_secs == 0 {
        errors.push(ValidationError::new("proxy.request_timeout_secs", "must be greater than 0"));
    }

    let cleanup = config.lifecycle.cleanup_timeout();
    if cleanup.is_zero() || cleanup >= HOST_SHUTDOWN_CEILING {
        errors.push(ValidationError::new(
            "lifecycle.cleanup_timeout_ms",
            format!("must be between 1 and {} ms", HOST_SHUTDOWN_CEILING.as_millis() - 1),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&BridgeConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = BridgeConfig::default();
        config.control_plane.device_tag = "printworks".into();
        config.proxy.route_prefix = "papercut/".into();
        config.lifecycle.cleanup_timeout_ms = 2_500;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "control_plane.device_tag",
                "proxy.route_prefix",
                "lifecycle.cleanup_timeout_ms"
            ]
        );
    }

    #[test]
    fn test_rejects_multi_day_key_ttl() {
        let mut config = BridgeConfig::default();
        config.control_plane.key_ttl_secs = 90 * 24 * 60 * 60;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "control_plane.key_ttl_secs");

        config.control_plane.key_ttl_secs = MAX_KEY_TTL_SECS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_key_ttl_must_outlive_join_and_cleanup() {
        let mut config = BridgeConfig::default();
        config.overlay.join_timeout_secs = 10;
        config.lifecycle.cleanup_timeout_ms = 1_800;

        config.control_plane.key_ttl_secs = 11;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "control_plane.key_ttl_secs");

        config.control_plane.key_ttl_secs = 12;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_prefix_is_allowed() {
        let mut config = BridgeConfig::default();
        config.proxy.route_prefix = String::new();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let mut config = BridgeConfig::default();
        config.control_plane.base_url = "ftp://api.example.com".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "control_plane.base_url");
    }
}
