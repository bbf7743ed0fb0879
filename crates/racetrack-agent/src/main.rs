//! # Racetrack Agent
//!
//! Runs one participant's tracking engine against the race service and
//! exposes a small control API. Without device hardware the location and
//! battery come from a simulated runner following the configured route.

mod config;
mod error;
mod handlers;
mod remote;
mod routes;
mod simulation;
mod state;

use crate::config::AgentConfig;
use crate::remote::{HttpRemote, spawn_reachability_probe};
use crate::routes::create_router;
use crate::simulation::{SimulatedBattery, SimulatedRunner};
use crate::state::AppState;

use racetrack_core::RegistrationId;
use racetrack_store::{StoreClient, StoreConfig};
use racetrack_telemetry::MetricsCollector;
use racetrack_tracker::{SessionManager, TrackerDeps};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_logging();

    info!("Starting Racetrack agent v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AgentConfig::from_env()?;
    info!("Configuration loaded");
    info!("   API Port: {}", config.api_port);
    info!("   Race service: {}", config.remote_url);
    info!("   Data dir: {}", config.data_dir.display());

    let metrics = Arc::new(MetricsCollector::new()?);
    let store = Arc::new(
        StoreClient::new(StoreConfig {
            data_dir: config.data_dir.clone(),
        })
        .await?,
    );

    // Race service client and reachability probe
    let remote = Arc::new(HttpRemote::new(&config.remote_url, config.remote_timeout())?);
    let probe_cancel = CancellationToken::new();
    let network = spawn_reachability_probe(remote.clone(), config.probe_interval(), probe_cancel.clone());

    let deps = TrackerDeps::new(
        Arc::new(SimulatedRunner::new(&config.simulation)),
        remote.clone(),
        remote,
        store,
    )
    .with_battery(Arc::new(SimulatedBattery::new(&config.simulation)))
    .with_network(network)
    .with_metrics(metrics.clone());

    let tracker = SessionManager::new(config.tracker.to_tracker_config(), deps).await;

    // Pick up a session that survived a restart, or start the configured one
    match tracker.restore().await {
        Ok(Some(session)) => info!(
            "Restored session for {} started at {}",
            session.registration_id, session.start_time
        ),
        Ok(None) => {
            if let Some(id) = config.registration_id.as_deref() {
                match tracker.start(&RegistrationId::new(id)).await {
                    Ok(session) => info!(
                        "Tracking {} every {}s",
                        session.registration_id, session.interval_seconds
                    ),
                    Err(e) => error!("Failed to start session for {}: {}", id, e),
                }
            }
        }
        Err(e) => warn!("Failed to restore session: {}", e),
    }

    let state = AppState::new(config.clone(), tracker.clone(), metrics);
    let app = create_router(state);

    // Start API server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    info!("API server listening on http://{}", addr);
    info!("Metrics available at http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracker.shutdown().await;
    probe_cancel.cancel();

    info!("Agent shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,racetrack_tracker=debug,racetrack_agent=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        }
    }
}
