//! Overlay network membership subsystem.
//!
//! # Data Flow
//! ```text
//! JoinCredential + hostname
//!     → OverlayNetwork::join
//!         → tailscaled.rs (spawn userspace node, `up`, read status)
//!     → JoinedNode { node handle, HTTP transport, NetworkIdentity }
//!
//! Cleanup:
//!     → identity.rs (find this instance's device by node ID, then addresses)
//!     → OverlayNode::close (stop the local node)
//! ```
//!
//! # Design Decisions
//! - Join and close sit behind traits so lifecycle logic runs against fakes
//! - The join has its own timeout independent of the caller
//! - The transport routes through the node, so the backend is only reachable
//!   once the join has succeeded

pub mod hostname;
pub mod identity;
pub mod tailscaled;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::credentials::JoinCredential;

pub use hostname::generate_hostname;
pub use identity::{find_own_device, is_own_device, DeviceMatch, NetworkIdentity};
pub use tailscaled::TailscaledNetwork;

/// Errors raised while joining or leaving the overlay network.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to prepare state directory {path}: {source}")]
    StateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("node did not come up within {0:?}")]
    Timeout(Duration),

    #[error("unexpected node status: {0}")]
    Status(String),

    #[error("failed to build overlay transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to stop node: {0}")]
    Close(#[source] std::io::Error),
}

/// A running local overlay node.
#[async_trait]
pub trait OverlayNode: Send + Sync {
    /// Stop the node. Calling close on a stopped node succeeds.
    async fn close(&self) -> Result<(), NodeError>;
}

/// Result of a successful join.
pub struct JoinedNode {
    pub node: Arc<dyn OverlayNode>,
    /// HTTP client whose connections travel over the overlay network.
    pub transport: reqwest::Client,
    pub identity: NetworkIdentity,
}

impl std::fmt::Debug for JoinedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinedNode")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Starts local nodes and joins them to the overlay network.
#[async_trait]
pub trait OverlayNetwork: Send + Sync {
    async fn join(&self, credential: &JoinCredential, hostname: &str) -> Result<JoinedNode, NodeError>;
}
