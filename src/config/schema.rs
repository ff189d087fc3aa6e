//! Node settings schema.
//!
//! Everything the node needs besides its persisted identity (port, token,
//! manager), which lives in the state file instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::proxy::model::Log;

/// Root settings for the node agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    pub http: HttpConfig,
    pub state: StateConfig,
    pub engine: EngineConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Local HTTP API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind host. The port comes from the persisted node state.
    pub host: String,

    /// Total time allowed per request in seconds.
    pub request_timeout_secs: u64,

    /// Largest accepted request body.
    pub max_body_bytes: usize,

    /// Expected `X-App-Name` header value on config pushes.
    pub client_name: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 2 * 1024 * 1024,
            client_name: "Arch-Manager".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: "storage/database/app.json".to_string(),
        }
    }
}

/// External engine process settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable.
    pub binary_path: String,

    /// Where the running configuration is written before each restart.
    pub config_path: String,

    /// Engine log level (debug, info, warning, error, none).
    pub log_level: String,

    pub access_log: String,
    pub error_log: String,

    /// Time allowed for the engine to exit on shutdown.
    pub shutdown_grace_secs: u64,

    /// Upper bound on a stats query.
    pub stats_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary_path: "third_party/xray-linux-64/xray".to_string(),
            config_path: "storage/app/xray.json".to_string(),
            log_level: "warning".to_string(),
            access_log: "storage/logs/xray-access.log".to_string(),
            error_log: "storage/logs/xray-error.log".to_string(),
            shutdown_grace_secs: 5,
            stats_timeout_secs: 5,
        }
    }
}

impl EngineConfig {
    /// Log block for the base configuration.
    pub fn log(&self) -> Log {
        Log {
            loglevel: self.log_level.clone(),
            access: self.access_log.clone(),
            error: self.error_log.clone(),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn stats_timeout(&self) -> Duration {
        Duration::from_secs(self.stats_timeout_secs)
    }
}

/// Reconciliation loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            request_timeout_secs: 10,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus scrape endpoint.
    pub enabled: bool,

    /// Scrape endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9100".to_string(),
        }
    }
}
