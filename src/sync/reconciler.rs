//! Periodic drift detection against the remote manager.
//!
//! # States
//! - Idle: waiting for the next tick or for shutdown
//! - Syncing: fetch → diff → maybe apply
//!
//! # State Transitions
//! ```text
//! Idle → Syncing: timer tick (fixed interval)
//! Syncing → Idle: always, whether the cycle succeeded or failed
//! Idle → exit:    shutdown signal (cleanup hook runs)
//! ```
//!
//! # Design Decisions
//! - One sequential loop; ticks never overlap
//! - No backoff: the interval itself is the retry policy
//! - Errors are logged here and never propagate; no caller is waiting

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::engine::Engine;
use crate::observability::metrics;
use crate::proxy::compat::sanitize_config;
use crate::proxy::model::API_TAG;
use crate::proxy::validation::validate;
use crate::state::StateStore;
use crate::sync::manager::{ManagerClient, SyncError};

/// Result of one reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No manager registered.
    Skipped,
    /// Remote and running configs are equal.
    Unchanged,
    /// Remote config replaced the running one and a restart was requested.
    Applied,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Skipped => "skipped",
            SyncOutcome::Unchanged => "unchanged",
            SyncOutcome::Applied => "applied",
        }
    }
}

pub struct Reconciler {
    state: Arc<StateStore>,
    engine: Engine,
    client: ManagerClient,
    interval: Duration,
    cleanup: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Reconciler {
    pub fn new(state: Arc<StateStore>, engine: Engine, client: ManagerClient, interval: Duration) -> Self {
        Self {
            state,
            engine,
            client,
            interval,
            cleanup: None,
        }
    }

    /// Hook invoked once after the loop stops.
    pub fn with_cleanup(mut self, cleanup: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Reconciler starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sync_once().await {
                        Ok(outcome) => {
                            tracing::debug!(outcome = outcome.as_str(), "Sync cycle complete");
                            metrics::record_sync(outcome.as_str());
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Sync cycle failed; retrying next tick");
                            metrics::record_sync("failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Reconciler received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }

    /// One fetch-compare-apply pass.
    pub async fn sync_once(&self) -> Result<SyncOutcome, SyncError> {
        let Some(manager) = self.state.manager() else {
            return Ok(SyncOutcome::Skipped);
        };

        let fetched = self.client.fetch_config(&manager).await?;
        let mut desired = sanitize_config(fetched);
        let current = self.engine.config();

        // The api listener address is internal; keep the running one.
        if let Some(port) = current.api_port() {
            if let Some(api) = desired.inbounds.iter_mut().find(|i| i.tag == API_TAG) {
                api.port = port;
            }
        }

        validate(&desired).map_err(SyncError::Invalid)?;

        if desired.equals(&current) {
            return Ok(SyncOutcome::Unchanged);
        }

        tracing::info!(manager = %manager.url, "Remote config changed, applying");
        self.engine.apply(desired, "manager");
        Ok(SyncOutcome::Applied)
    }
}
