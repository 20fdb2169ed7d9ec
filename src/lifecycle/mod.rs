//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Register signals → Fetch params (concurrent) → Exchange token
//!     → Mint join credential → Join overlay → Publish forwarder
//!
//! State (state.rs):
//!     Write-once slots filled by startup, read by requests and cleanup
//!
//! Shutdown (shutdown.rs):
//!     Idle → Running → Done, once
//!     Delete device ∥ Delete credential ∥ Close node, under one deadline
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/SIGQUIT/SIGHUP → cleanup → exit
//! ```
//!
//! # Design Decisions
//! - Cleanup of a resource startup never created is a no-op
//! - Shutdown has a deadline below the host's 2s ceiling; the process exits
//!   when it fires, abandoning unfinished actions

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use shutdown::{ActionOutcome, CleanupAction, CleanupCoordinator, CleanupPhase, CleanupReport};
pub use signals::{spawn_listener, ShutdownSignals};
pub use startup::Startup;
pub use state::LifecycleState;
