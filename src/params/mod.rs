//! Parameter retrieval subsystem.
//!
//! # Data Flow
//! ```text
//! Startup
//!     → bootstrap.rs (two fetches, joined concurrently)
//!     → ParameterStore::fetch (one network call each, no caching)
//!     → extension.rs (parameters extension over loopback HTTP)
//!     → BootstrapParameters (immutable for the instance lifetime)
//! ```
//!
//! # Design Decisions
//! - The store is a trait so startup can be driven by in-memory fakes
//! - Either fetch failing is fatal; there is no partial bootstrap
//! - Secret values never reach the logs

pub mod bootstrap;
pub mod extension;

use async_trait::async_trait;
use thiserror::Error;

pub use bootstrap::{BootstrapParameters, OAuthClient};
pub use extension::ExtensionParameterStore;

/// Errors returned by a single parameter fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("parameter '{0}' not found")]
    NotFound(String),

    #[error("not authorized to read parameter '{name}': {reason}")]
    Unauthorized { name: String, reason: String },

    #[error("transport error reading parameter '{name}': {reason}")]
    Transport { name: String, reason: String },
}

/// A remote key-value configuration store.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Fetch one named value, decrypting it server-side when `decrypt` is set.
    async fn fetch(&self, name: &str, decrypt: bool) -> Result<String, ParameterError>;
}
