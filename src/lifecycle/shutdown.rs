//! Cleanup coordination for the instance.
//!
//! The coordinator moves through `Idle → Running → Done` exactly once. The
//! first trigger runs the teardown; every later or concurrent trigger waits
//! for it to finish and returns without running anything.
//!
//! Teardown first seals the lifecycle state, waiting for any startup step in
//! flight to record what it acquired. It then launches three independent
//! actions under the same shared deadline:
//! delete this instance's device, delete the join credential, stop the local
//! node. Each logs its own outcome and none is retried. Actions still running
//! when the deadline fires are aborted and reported as abandoned.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use crate::credentials::ControlPlane;
use crate::error::CleanupError;
use crate::lifecycle::state::LifecycleState;
use crate::observability::metrics;
use crate::overlay::{find_own_device, NetworkIdentity};

/// Coordinator state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPhase {
    Idle = 0,
    Running = 1,
    Done = 2,
}

impl From<u8> for CleanupPhase {
    fn from(val: u8) -> Self {
        match val {
            0 => CleanupPhase::Idle,
            1 => CleanupPhase::Running,
            _ => CleanupPhase::Done,
        }
    }
}

/// One independent teardown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupAction {
    DeleteDevice,
    DeleteCredential,
    CloseNode,
}

impl CleanupAction {
    pub const ALL: [CleanupAction; 3] = [
        CleanupAction::DeleteDevice,
        CleanupAction::DeleteCredential,
        CleanupAction::CloseNode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupAction::DeleteDevice => "delete_device",
            CleanupAction::DeleteCredential => "delete_credential",
            CleanupAction::CloseNode => "close_node",
        }
    }
}

impl std::fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a teardown action ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Succeeded,
    /// Startup never created the resource.
    Skipped,
    Failed(CleanupError),
    /// Still running when the deadline fired.
    Abandoned,
}

impl ActionOutcome {
    fn label(&self) -> &'static str {
        match self {
            ActionOutcome::Succeeded => "succeeded",
            ActionOutcome::Skipped => "skipped",
            ActionOutcome::Failed(_) => "failed",
            ActionOutcome::Abandoned => "abandoned",
        }
    }
}

/// Summary of one teardown run.
#[derive(Debug, Clone)]
pub struct CleanupReport {
    pub outcomes: Vec<(CleanupAction, ActionOutcome)>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl CleanupReport {
    pub fn outcome(&self, action: CleanupAction) -> Option<&ActionOutcome> {
        self.outcomes
            .iter()
            .find(|(a, _)| *a == action)
            .map(|(_, outcome)| outcome)
    }

    /// All actions finished in time without failing.
    pub fn is_success(&self) -> bool {
        !self.timed_out
            && self
                .outcomes
                .iter()
                .all(|(_, o)| matches!(o, ActionOutcome::Succeeded | ActionOutcome::Skipped))
    }
}

type ActionFuture = Pin<Box<dyn Future<Output = ActionOutcome> + Send>>;

/// Exactly-once, deadline-bounded teardown of the instance's resources.
pub struct CleanupCoordinator {
    phase: AtomicU8,
    done: watch::Sender<bool>,
    state: Arc<LifecycleState>,
    timeout: Duration,
}

impl CleanupCoordinator {
    pub fn new(state: Arc<LifecycleState>, timeout: Duration) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            phase: AtomicU8::new(CleanupPhase::Idle as u8),
            done,
            state,
            timeout,
        }
    }

    pub fn phase(&self) -> CleanupPhase {
        CleanupPhase::from(self.phase.load(Ordering::Acquire))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the teardown if no one has yet.
    ///
    /// Returns the report for the single run that performed the teardown and
    /// `None` for every other caller, after that run has finished.
    pub async fn run(&self) -> Option<CleanupReport> {
        if self
            .phase
            .compare_exchange(
                CleanupPhase::Idle as u8,
                CleanupPhase::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::debug!(phase = ?self.phase(), "Cleanup already triggered, ignoring");
            let mut done = self.done.subscribe();
            let _ = done.wait_for(|finished| *finished).await;
            return None;
        }

        tracing::info!(timeout_ms = self.timeout.as_millis() as u64, "Cleaning up ...");
        let report = self.teardown().await;

        self.phase.store(CleanupPhase::Done as u8, Ordering::Release);
        self.done.send_replace(true);
        Some(report)
    }

    async fn teardown(&self) -> CleanupReport {
        let start = Instant::now();
        let deadline_at = tokio::time::Instant::now() + self.timeout;

        // A step in flight may be about to record a resource it already holds.
        if tokio::time::timeout_at(deadline_at, self.state.seal()).await.is_err() {
            tracing::warn!("Startup step still in flight, cleaning up what was recorded");
        }

        let (tx, mut rx) = mpsc::channel(CleanupAction::ALL.len());

        let mut handles = Vec::with_capacity(CleanupAction::ALL.len());
        for action in CleanupAction::ALL {
            let fut = self.action(action);
            let tx = tx.clone();
            let handle = tokio::spawn(async move {
                let outcome = fut.await;
                let _ = tx.send((action, outcome)).await;
            });
            handles.push((action, handle));
        }
        drop(tx);

        let deadline = tokio::time::sleep_until(deadline_at);
        tokio::pin!(deadline);

        let mut outcomes = Vec::with_capacity(CleanupAction::ALL.len());
        let mut timed_out = false;
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some((action, outcome)) => {
                        log_outcome(action, &outcome);
                        outcomes.push((action, outcome));
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            // Anything that landed while the deadline fired still counts.
            while let Ok((action, outcome)) = rx.try_recv() {
                log_outcome(action, &outcome);
                outcomes.push((action, outcome));
            }

            for (action, handle) in &handles {
                if outcomes.iter().any(|(a, _)| a == action) {
                    continue;
                }
                handle.abort();
                log_outcome(*action, &ActionOutcome::Abandoned);
                outcomes.push((*action, ActionOutcome::Abandoned));
            }

            metrics::record_cleanup_timeout();
            tracing::warn!(
                error = %CleanupError::DeadlineExceeded(self.timeout),
                "Cleanup timed out"
            );
        } else {
            tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Cleanup completed successfully"
            );
        }

        CleanupReport {
            outcomes,
            timed_out,
            elapsed: start.elapsed(),
        }
    }

    fn action(&self, action: CleanupAction) -> ActionFuture {
        match action {
            CleanupAction::DeleteDevice => {
                match (self.state.control_plane(), self.state.identity().cloned()) {
                    (Some(api), Some(identity)) => {
                        Box::pin(async move { into_outcome(action, delete_own_device(api, identity).await) })
                    }
                    _ => Box::pin(async { ActionOutcome::Skipped }),
                }
            }
            CleanupAction::DeleteCredential => {
                match (self.state.control_plane(), self.state.credential().map(|c| c.id.clone())) {
                    (Some(api), Some(credential_id)) => Box::pin(async move {
                        tracing::info!(credential_id = %credential_id, "Deleting join credential ...");
                        let result = api
                            .delete_join_credential(&credential_id)
                            .await
                            .map_err(|e| e.to_string());
                        into_outcome(action, result)
                    }),
                    _ => Box::pin(async { ActionOutcome::Skipped }),
                }
            }
            CleanupAction::CloseNode => match self.state.node() {
                Some(node) => Box::pin(async move {
                    tracing::info!("Shutting down overlay node ...");
                    into_outcome(action, node.close().await.map_err(|e| e.to_string()))
                }),
                None => Box::pin(async { ActionOutcome::Skipped }),
            },
        }
    }
}

async fn delete_own_device(api: Arc<dyn ControlPlane>, identity: NetworkIdentity) -> Result<(), String> {
    let devices = api.list_devices().await.map_err(|e| e.to_string())?;

    let (device, matched_by) = find_own_device(&identity, &devices)
        .ok_or_else(|| format!("device for node {} not found", identity.node_id))?;

    tracing::info!(
        device_id = %device.id,
        node_id = %identity.node_id,
        matched_by = ?matched_by,
        "Deleting overlay device ..."
    );
    api.delete_device(&device.id).await.map_err(|e| e.to_string())
}

fn into_outcome(action: CleanupAction, result: Result<(), String>) -> ActionOutcome {
    match result {
        Ok(()) => ActionOutcome::Succeeded,
        Err(reason) => ActionOutcome::Failed(CleanupError::ActionFailed {
            action: action.as_str(),
            reason,
        }),
    }
}

fn log_outcome(action: CleanupAction, outcome: &ActionOutcome) {
    metrics::record_cleanup_action(action.as_str(), outcome.label());
    match outcome {
        ActionOutcome::Succeeded => tracing::info!(action = %action, "Cleanup action succeeded"),
        ActionOutcome::Skipped => {
            tracing::debug!(action = %action, "Cleanup action skipped, resource never created")
        }
        ActionOutcome::Failed(e) => tracing::warn!(action = %action, error = %e, "Cleanup action failed"),
        ActionOutcome::Abandoned => tracing::warn!(action = %action, "Cleanup action abandoned at deadline"),
    }
}
