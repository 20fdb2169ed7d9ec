//! Process-wide lifecycle state.
//!
//! Every slot is written at most once, by startup, and only read afterwards
//! by request handling and cleanup. A slot startup never reached stays empty,
//! which cleanup treats as "nothing to tear down".
//!
//! Startup runs each acquire-then-record pair under a step guard. Cleanup
//! seals the state before reading it: no new step may begin, and the step in
//! flight settles first, so a resource acquired remotely is always visible
//! to the teardown that follows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, MutexGuard};

use crate::credentials::{ControlPlane, JoinCredential};
use crate::error::StartupError;
use crate::overlay::{NetworkIdentity, OverlayNode};
use crate::proxy::Forwarder;

/// Resources acquired by startup and released by cleanup.
#[derive(Default)]
pub struct LifecycleState {
    control_plane: OnceLock<Arc<dyn ControlPlane>>,
    credential: OnceLock<JoinCredential>,
    node: OnceLock<Arc<dyn OverlayNode>>,
    identity: OnceLock<NetworkIdentity>,
    forwarder: OnceLock<Arc<Forwarder>>,
    step: Mutex<()>,
    sealed: AtomicBool,
}

fn write_once<T>(slot: &OnceLock<T>, value: T) -> Result<(), StartupError> {
    slot.set(value).map_err(|_| StartupError::AlreadyStarted)
}

impl LifecycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter one startup step. Fails once cleanup has sealed the state.
    pub async fn begin_step(&self) -> Result<MutexGuard<'_, ()>, StartupError> {
        let guard = self.step.lock().await;
        if self.is_sealed() {
            return Err(StartupError::ShuttingDown);
        }
        Ok(guard)
    }

    /// Refuse further startup steps and wait for the one in flight.
    ///
    /// The caller bounds the wait; sealing takes effect immediately either way.
    pub async fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
        let _settled = self.step.lock().await;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn set_control_plane(&self, api: Arc<dyn ControlPlane>) -> Result<(), StartupError> {
        write_once(&self.control_plane, api)
    }

    pub fn set_credential(&self, credential: JoinCredential) -> Result<(), StartupError> {
        write_once(&self.credential, credential)
    }

    pub fn set_node(&self, node: Arc<dyn OverlayNode>) -> Result<(), StartupError> {
        write_once(&self.node, node)
    }

    pub fn set_identity(&self, identity: NetworkIdentity) -> Result<(), StartupError> {
        write_once(&self.identity, identity)
    }

    /// Publish the ready forwarder. After this the instance serves traffic.
    pub fn publish_forwarder(&self, forwarder: Arc<Forwarder>) -> Result<(), StartupError> {
        write_once(&self.forwarder, forwarder)
    }

    pub fn control_plane(&self) -> Option<Arc<dyn ControlPlane>> {
        self.control_plane.get().cloned()
    }

    pub fn credential(&self) -> Option<&JoinCredential> {
        self.credential.get()
    }

    pub fn node(&self) -> Option<Arc<dyn OverlayNode>> {
        self.node.get().cloned()
    }

    pub fn identity(&self) -> Option<&NetworkIdentity> {
        self.identity.get()
    }

    pub fn forwarder(&self) -> Option<Arc<Forwarder>> {
        self.forwarder.get().cloned()
    }

    /// True once a forwarder has been published.
    pub fn is_ready(&self) -> bool {
        self.forwarder.get().is_some()
    }
}

impl std::fmt::Debug for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleState")
            .field("control_plane", &self.control_plane.get().is_some())
            .field("credential", &self.credential.get().map(|c| &c.id))
            .field("node", &self.node.get().is_some())
            .field("identity", &self.identity.get())
            .field("ready", &self.is_ready())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
