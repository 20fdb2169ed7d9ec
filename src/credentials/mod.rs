//! Credential exchange subsystem.
//!
//! # Data Flow
//! ```text
//! OAuthClient {id, key}
//!     → oauth.rs (basic auth → bearer token)
//!     → api.rs (TailscaleApi: ControlPlane)
//!     → create_join_credential (single-use, ephemeral, tagged, time-boxed)
//!     → JoinCredential handed to the overlay node
//!
//! Cleanup:
//!     → list_devices / delete_device / delete_join_credential
//! ```
//!
//! # Security Constraints
//! - Client key, bearer token and join secret never appear in logs
//! - Credentials are never reusable; one credential joins one device

pub mod api;
pub mod oauth;
pub mod types;

pub use api::{ControlPlane, TailscaleApi};
pub use oauth::exchange;
pub use types::{AccessToken, ApiError, Device, JoinCredential, JoinCredentialRequest};
