//! Credential and device types shared with the management API.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors from the overlay management API (token endpoint included).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} returned status {status}: {message}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("{operation} returned an unreadable body: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    /// True when the API reported the resource as already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if *status == reqwest::StatusCode::NOT_FOUND)
    }
}

/// Short-lived bearer token minted from the OAuth client.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Parameters for minting a join credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCredentialRequest {
    /// Tag every device joined with the credential receives.
    pub tag: String,
    /// Lifetime before the credential expires on its own.
    pub ttl: Duration,
}

/// Single-use, ephemeral credential authorizing one device to join.
#[derive(Clone, PartialEq, Eq)]
pub struct JoinCredential {
    /// The secret handed to the local node.
    pub secret: String,
    /// Identifier used to delete the credential.
    pub id: String,
    /// Expiry timestamp as reported by the API (RFC 3339).
    pub expires: Option<String>,
    pub device_tag: String,
    pub reusable: bool,
    pub ephemeral: bool,
}

impl std::fmt::Debug for JoinCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinCredential")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .field("expires", &self.expires)
            .field("device_tag", &self.device_tag)
            .field("reusable", &self.reusable)
            .field("ephemeral", &self.ephemeral)
            .finish()
    }
}

/// A device registered on the overlay network.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Legacy device identifier, used in delete calls.
    pub id: String,
    /// Stable node identifier.
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub hostname: String,
    /// Overlay addresses assigned to the device.
    #[serde(default)]
    pub addresses: Vec<String>,
}
