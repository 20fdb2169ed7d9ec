//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGTERM, SIGINT, SIGQUIT and SIGHUP
//! - Route the first delivered signal into the cleanup coordinator
//! - Terminate the process once cleanup has resolved
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered before startup begins, so a signal that lands
//!   mid-startup still reclaims whatever was acquired so far
//! - All four signals mean the same thing; SIGHUP does not reload

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::CleanupCoordinator;

/// Registered termination signal streams.
#[cfg(unix)]
pub struct ShutdownSignals {
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    /// Install the handlers. Must run inside a Tokio runtime.
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            quit: signal(SignalKind::quit())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next termination signal and name it.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.quit.recv() => "SIGQUIT",
            _ = self.hangup.recv() => "SIGHUP",
        }
    }
}

/// Ctrl+C only, where Unix signals are unavailable.
#[cfg(not(unix))]
pub struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    pub fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "CTRL_C"
    }
}

/// Spawn the listener that turns the first signal into cleanup and exit.
///
/// `exit` is called with status 0 after cleanup resolves, whether it
/// completed or hit its deadline. Production passes `std::process::exit`.
pub fn spawn_listener<F>(
    mut signals: ShutdownSignals,
    coordinator: Arc<CleanupCoordinator>,
    exit: F,
) -> JoinHandle<()>
where
    F: FnOnce(i32) + Send + 'static,
{
    tokio::spawn(async move {
        let signal = signals.recv().await;
        tracing::info!(signal, "Signal received, cleaning up");

        match coordinator.run().await {
            Some(report) => tracing::info!(
                timed_out = report.timed_out,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Cleanup finished, exiting"
            ),
            None => tracing::info!("Cleanup already ran, exiting"),
        }

        exit(0);
    })
}
