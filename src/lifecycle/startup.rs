//! Startup orchestration.
//!
//! # Responsibilities
//! - Fetch bootstrap parameters (two fetches, concurrently)
//! - Exchange the OAuth client for a bearer token
//! - Mint a single-use, ephemeral join credential
//! - Join the overlay network and publish the forwarder
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Each acquired resource is recorded in `LifecycleState` as soon as it
//!   exists, so cleanup can reclaim it even if a later step fails
//! - Every acquire-then-record pair runs under a step guard; once cleanup
//!   has sealed the state, the next step fails with `ShuttingDown`
//! - The forwarder is published last (traffic only when ready)

use std::sync::Arc;
use std::time::Instant;

use crate::config::BridgeConfig;
use crate::credentials::{self, ControlPlane, JoinCredentialRequest, TailscaleApi};
use crate::error::StartupError;
use crate::lifecycle::state::LifecycleState;
use crate::observability::metrics;
use crate::overlay::{generate_hostname, OverlayNetwork};
use crate::params::{BootstrapParameters, ParameterStore};
use crate::proxy::Forwarder;

/// Brings one instance from cold start to serving.
pub struct Startup {
    config: BridgeConfig,
    store: Arc<dyn ParameterStore>,
    network: Arc<dyn OverlayNetwork>,
    http: reqwest::Client,
}

impl Startup {
    /// `http` is used for the token endpoint and the management API.
    pub fn new(
        config: BridgeConfig,
        store: Arc<dyn ParameterStore>,
        network: Arc<dyn OverlayNetwork>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            store,
            network,
            http,
        }
    }

    /// Run the startup sequence, recording acquired resources in `state`.
    pub async fn run(&self, state: &LifecycleState) -> Result<Arc<Forwarder>, StartupError> {
        let start_time = Instant::now();
        tracing::info!("Starting up ...");

        let result = self.acquire(state).await;
        metrics::record_startup(result.is_ok(), start_time);

        match &result {
            Ok(forwarder) => tracing::info!(
                target = %forwarder.target(),
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                "Startup completed"
            ),
            Err(e) => tracing::error!(error = %e, "Startup failed"),
        }
        result
    }

    async fn acquire(&self, state: &LifecycleState) -> Result<Arc<Forwarder>, StartupError> {
        let params = {
            let _step = state.begin_step().await?;
            tracing::info!("Getting startup parameters ...");
            BootstrapParameters::fetch(self.store.as_ref(), &self.config.parameters).await?
        };

        let control_plane = &self.config.control_plane;
        let api: Arc<dyn ControlPlane> = {
            let _step = state.begin_step().await?;
            let token =
                credentials::exchange(&self.http, &control_plane.base_url, &params.oauth_client).await?;
            let api: Arc<dyn ControlPlane> = Arc::new(TailscaleApi::new(
                self.http.clone(),
                control_plane.base_url.clone(),
                token,
            ));
            state.set_control_plane(api.clone())?;
            api
        };

        let credential = {
            let _step = state.begin_step().await?;
            let credential = api
                .create_join_credential(&JoinCredentialRequest {
                    tag: control_plane.device_tag.clone(),
                    ttl: control_plane.key_ttl(),
                })
                .await?;
            state.set_credential(credential.clone())?;
            credential
        };

        let transport = {
            let _step = state.begin_step().await?;
            let hostname = generate_hostname(&self.config.overlay.hostname_prefix);
            tracing::info!(hostname = %hostname, "Joining overlay network ...");
            let joined = self.network.join(&credential, &hostname).await?;

            state.set_node(joined.node)?;
            state.set_identity(joined.identity)?;
            joined.transport
        };

        let _step = state.begin_step().await?;
        let forwarder = Arc::new(Forwarder::from_config(
            params.target,
            transport,
            &self.config.proxy,
        ));
        state.publish_forwarder(forwarder.clone())?;

        Ok(forwarder)
    }
}
