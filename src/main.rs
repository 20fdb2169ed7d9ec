//! Overlay Bridge
//!
//! Publishes an internal HTTP backend to the gateway from inside a
//! serverless instance, reaching the backend over an overlay network.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────────┐
//!                         │                  OVERLAY BRIDGE                   │
//!                         │                                                   │
//!   Gateway request       │  ┌─────────┐    ┌───────────┐    ┌────────────┐  │
//!   ──────────────────────┼─▶│  proxy  │───▶│ forwarder │───▶│  overlay   │──┼──▶ Backend
//!                         │  │ server  │    │ (prefix   │    │ transport  │  │   (private)
//!                         │  └─────────┘    │  strip)   │    └────────────┘  │
//!                         │                 └───────────┘                    │
//!                         │                                                   │
//!                         │  ┌──────────────────────┐  ┌──────────────────┐  │
//!                         │  │  lifecycle/startup   │  │ lifecycle/       │  │
//!                         │  │ params → credentials │  │ shutdown+signals │  │
//!                         │  │ → overlay join       │  │ deadline cleanup │  │
//!                         │  └──────────────────────┘  └──────────────────┘  │
//!                         └───────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use overlay_bridge::config::{load_or_default, CONFIG_PATH_ENV};
use overlay_bridge::lifecycle::{
    spawn_listener, CleanupCoordinator, LifecycleState, ShutdownSignals, Startup,
};
use overlay_bridge::observability;
use overlay_bridge::overlay::TailscaledNetwork;
use overlay_bridge::params::ExtensionParameterStore;
use overlay_bridge::proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "overlay-bridge")]
#[command(about = "Expose a private backend through an ephemeral overlay network node", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Override the HTTP bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_or_default(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.proxy.bind_address = bind;
    }

    observability::logging::init(&config.observability);

    tracing::info!("overlay-bridge v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    // Signals first: a shutdown during startup must still reclaim resources.
    let state = Arc::new(LifecycleState::new());
    let coordinator = Arc::new(CleanupCoordinator::new(
        state.clone(),
        config.lifecycle.cleanup_timeout(),
    ));
    spawn_listener(ShutdownSignals::register()?, coordinator.clone(), |code| {
        std::process::exit(code)
    });

    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.control_plane.request_timeout_ms))
        .build()?;
    let store = Arc::new(ExtensionParameterStore::from_env(&config.parameters)?);
    let network = Arc::new(TailscaledNetwork::new(config.overlay.clone()));

    let startup = Startup::new(config.clone(), store, network, http);
    let forwarder = match startup.run(&state).await {
        Ok(forwarder) => forwarder,
        Err(_) => {
            // Reclaim whatever startup acquired before it failed.
            let _ = coordinator.run().await;
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&config.proxy.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(
                bind_address = %config.proxy.bind_address,
                error = %e,
                "Failed to bind HTTP listener"
            );
            let _ = coordinator.run().await;
            std::process::exit(1);
        }
    };

    // Runs until the signal listener terminates the process.
    let server = ProxyServer::new(forwarder, &config.proxy);
    server.run(listener, std::future::pending()).await?;

    Ok(())
}
