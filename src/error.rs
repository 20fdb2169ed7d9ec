//! Lifecycle error taxonomy.
//!
//! Startup errors are fatal: the instance never serves traffic. Cleanup
//! errors are logged per action and never stop the teardown sequence.

use std::time::Duration;
use thiserror::Error;

use crate::credentials::ApiError;
use crate::overlay::NodeError;
use crate::params::ParameterError;

/// Fatal errors raised while bringing an instance up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration missing: {name}: {reason}")]
    ConfigurationMissing { name: String, reason: String },

    #[error("credential exchange failed: {0}")]
    CredentialExchangeFailed(#[from] ApiError),

    #[error("network join failed: {0}")]
    NetworkJoinFailed(#[from] NodeError),

    #[error("startup already ran for this process")]
    AlreadyStarted,

    #[error("shutdown began before startup finished")]
    ShuttingDown,
}

impl StartupError {
    /// A required parameter could not be fetched.
    pub fn parameter(name: &str, source: ParameterError) -> Self {
        StartupError::ConfigurationMissing {
            name: name.to_string(),
            reason: source.to_string(),
        }
    }

    /// A parameter was fetched but its value is unusable.
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        StartupError::ConfigurationMissing {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Non-fatal errors raised during teardown.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CleanupError {
    #[error("{action} failed: {reason}")]
    ActionFailed { action: &'static str, reason: String },

    #[error("cleanup did not finish within {0:?}")]
    DeadlineExceeded(Duration),
}
