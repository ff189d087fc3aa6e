//! Node settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals and timeouts > 0)
//! - Validate enumerated strings (log levels)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NodeConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::NodeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const ENGINE_LOG_LEVELS: &[&str] = &["debug", "info", "warning", "error", "none"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.http.host.trim().is_empty() {
        errors.push(ValidationError::new("http.host", "must not be empty"));
    }
    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be greater than 0"));
    }
    if config.http.max_body_bytes == 0 {
        errors.push(ValidationError::new("http.max_body_bytes", "must be greater than 0"));
    }

    if config.state.path.trim().is_empty() {
        errors.push(ValidationError::new("state.path", "must not be empty"));
    }

    if config.engine.binary_path.trim().is_empty() {
        errors.push(ValidationError::new("engine.binary_path", "must not be empty"));
    }
    if config.engine.config_path.trim().is_empty() {
        errors.push(ValidationError::new("engine.config_path", "must not be empty"));
    }
    if !ENGINE_LOG_LEVELS.contains(&config.engine.log_level.as_str()) {
        errors.push(ValidationError::new(
            "engine.log_level",
            format!("must be one of {}", ENGINE_LOG_LEVELS.join(", ")),
        ));
    }
    if config.engine.stats_timeout_secs == 0 {
        errors.push(ValidationError::new("engine.stats_timeout_secs", "must be greater than 0"));
    }

    if config.sync.interval_secs == 0 {
        errors.push(ValidationError::new("sync.interval_secs", "must be greater than 0"));
    }
    if config.sync.request_timeout_secs == 0 {
        errors.push(ValidationError::new("sync.request_timeout_secs", "must be greater than 0"));
    }

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        errors.push(ValidationError::new(
            "logging.level",
            format!("must be one of {}", LOG_LEVELS.join(", ")),
        ));
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("metrics.address", "must be a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
