//! External proxy engine wrapper.
//!
//! # Data Flow
//! ```text
//! Local API / Reconciler
//!     → Engine::apply (swap whole ProxyConfig, enqueue restart)
//!     → restart actor (one task, owns the runner)
//!     → EngineRunner::restart(latest snapshot)
//!
//! Shutdown signal
//!     → actor stops the runner within the grace period
//! ```
//!
//! # Design Decisions
//! - Running config is an immutable value behind ArcSwap; readers take
//!   snapshots, writers replace it wholesale
//! - Restarts are serialized by a single owner instead of racing each other
//! - The actor restarts with the latest snapshot, so last write wins
//! - Requests queued while a restart is in flight collapse into one
//! - Restart failures are logged, never escalated; the next accepted write
//!   or changed sync retries implicitly

pub mod process;
pub mod stats;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::observability::metrics;
use crate::proxy::builders::base_config;
use crate::proxy::model::{Log, ProxyConfig};

pub use process::ProcessRunner;
pub use stats::StatsClient;

/// Engine control failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to write engine config to {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to serialize engine config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to spawn engine: {0}")]
    Spawn(std::io::Error),

    #[error("Failed to stop engine: {0}")]
    Stop(std::io::Error),

    #[error("Stats query failed: {0}")]
    Stats(String),

    #[error("Engine is not running")]
    NotRunning,
}

/// Something that can (re)start and stop the external engine.
pub trait EngineRunner: Send + 'static {
    /// Stop whatever is running and start again with `config`.
    fn restart(&mut self, config: &ProxyConfig) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Stop the engine if it is running.
    fn stop(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;
}

#[derive(Debug)]
enum Command {
    Restart { reason: &'static str },
}

/// Cheap, clonable handle to the running engine.
#[derive(Clone)]
pub struct Engine {
    config: Arc<ArcSwap<ProxyConfig>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Engine {
    /// Spawn the restart actor that owns `runner`.
    ///
    /// The held configuration starts empty; call [`Engine::init`] to install
    /// the base document and start the engine.
    pub fn spawn<R: EngineRunner>(
        runner: R,
        shutdown: broadcast::Receiver<()>,
        grace: Duration,
    ) -> (Self, JoinHandle<()>) {
        let config = Arc::new(ArcSwap::from_pointee(ProxyConfig::default()));
        let (tx, rx) = mpsc::unbounded_channel();

        let actor = RestartActor {
            runner,
            config: config.clone(),
            commands: rx,
            grace,
        };
        let handle = tokio::spawn(actor.run(shutdown));

        (Self { config, commands: tx }, handle)
    }

    /// Install the base configuration and start the engine.
    pub fn init(&self, api_port: u16, log: Log) {
        self.config.store(Arc::new(base_config(api_port, log)));
        self.request(Command::Restart { reason: "init" });
    }

    /// Snapshot of the running configuration.
    pub fn config(&self) -> Arc<ProxyConfig> {
        self.config.load_full()
    }

    /// Replace the running configuration and restart asynchronously.
    pub fn apply(&self, config: ProxyConfig, source: &'static str) {
        self.config.store(Arc::new(config));
        metrics::record_config_update(source);
        self.request(Command::Restart { reason: source });
    }

    /// Restart with the current configuration.
    pub fn restart(&self) {
        self.request(Command::Restart { reason: "manual" });
    }

    fn request(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Engine restart requested after the engine was shut down");
        }
    }
}

struct RestartActor<R> {
    runner: R,
    config: Arc<ArcSwap<ProxyConfig>>,
    commands: mpsc::UnboundedReceiver<Command>,
    grace: Duration,
}

impl<R: EngineRunner> RestartActor<R> {
    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Restart { reason }) => {
                        let reason = self.coalesce(reason);
                        self.restart(reason).await
                    }
                    None => break,
                },
                _ = shutdown.recv() => {
                    tracing::info!("Engine received shutdown signal");
                    break;
                }
            }
        }

        match timeout(self.grace, self.runner.stop()).await {
            Ok(Ok(())) => tracing::info!("Engine stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "Engine stop failed"),
            Err(_) => tracing::warn!(grace_secs = self.grace.as_secs(), "Engine did not stop within grace period"),
        }
    }

    /// Drain queued restarts; the snapshot taken next already covers them.
    fn coalesce(&mut self, mut reason: &'static str) -> &'static str {
        let mut skipped = 0usize;
        while let Ok(Command::Restart { reason: next }) = self.commands.try_recv() {
            reason = next;
            skipped += 1;
        }
        if skipped > 0 {
            tracing::debug!(reason, skipped, "Coalesced queued restart requests");
        }
        reason
    }

    async fn restart(&mut self, reason: &'static str) {
        let snapshot = self.config.load_full();
        match self.runner.restart(&snapshot).await {
            Ok(()) => {
                tracing::info!(
                    reason,
                    inbounds = snapshot.inbounds.len(),
                    outbounds = snapshot.outbounds.len(),
                    "Engine restarted"
                );
                metrics::record_restart(true);
            }
            Err(e) => {
                tracing::error!(reason, error = %e, "Engine restart failed");
                metrics::record_restart(false);
            }
        }
    }
}
