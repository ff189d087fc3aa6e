//! Startup orchestration.
//!
//! # Responsibilities
//! - Load or create the persisted node state
//! - Initialize subsystems in dependency order
//! - Start background tasks (engine actor, reconciler)
//! - Bind the HTTP listener and serve until a shutdown signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener starts last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::NodeConfig;
use crate::engine::{Engine, ProcessRunner, StatsClient};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::net::{self, PortError};
use crate::observability::metrics;
use crate::state::{StateError, StateStore};
use crate::sync::{ManagerClient, Reconciler};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Node state: {0}")]
    State(#[from] StateError),

    #[error("Engine api port: {0}")]
    Port(#[from] PortError),

    #[error("Metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("Invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("Manager client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("HTTP listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Bring the node up and block until it has shut down.
pub async fn run(config: NodeConfig) -> Result<(), StartupError> {
    let store = Arc::new(StateStore::new(&config.state.path));
    store.init()?;
    let settings = store
        .settings()
        .ok_or_else(|| StateError::Invalid("store is not initialized".into()))?;

    if config.metrics.enabled {
        let addr: SocketAddr = config
            .metrics
            .address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.metrics.address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();

    let runner = ProcessRunner::new(
        &config.engine.binary_path,
        &config.engine.config_path,
        config.engine.shutdown_grace(),
    );
    let (engine, engine_task) = Engine::spawn(runner, shutdown.subscribe(), config.engine.shutdown_grace());
    let api_port = net::allocate_free()?;
    engine.init(api_port, config.engine.log());
    tracing::info!(api_port, "Engine initialized with base config");

    let client = ManagerClient::new(config.sync.request_timeout())?;
    let reconciler = Reconciler::new(store.clone(), engine.clone(), client, config.sync.interval())
        .with_cleanup(|| tracing::debug!("Reconciler cleanup complete"));
    let reconciler_task = tokio::spawn(reconciler.run(shutdown.subscribe()));

    let state = AppState {
        store: store.clone(),
        engine: engine.clone(),
        stats: StatsClient::new(&config.engine.binary_path, config.engine.stats_timeout()),
        client_name: config.http.client_name.as_str().into(),
    };
    let listener = TcpListener::bind((config.http.host.as_str(), settings.http_port)).await?;
    let server = HttpServer::new(&config.http, state);
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        _ = signals::wait_for_signal() => {}
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => tracing::warn!("HTTP server exited unexpectedly"),
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
                Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
            }
        }
    }

    tracing::info!(subscribers = shutdown.receiver_count(), "Shutting down");
    shutdown.trigger();

    if !server_task.is_finished() {
        if let Err(e) = server_task.await {
            tracing::error!(error = %e, "HTTP server task panicked");
        }
    }
    if let Err(e) = reconciler_task.await {
        tracing::error!(error = %e, "Reconciler task panicked");
    }
    if let Err(e) = engine_task.await {
        tracing::error!(error = %e, "Engine task panicked");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
