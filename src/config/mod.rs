//! Node settings subsystem.
//!
//! # Data Flow
//! ```text
//! configs/node.toml (optional)
//!     → loader.rs (read & deserialize, missing file → defaults)
//!     → validation.rs (semantic checks)
//!     → NodeConfig (validated, immutable)
//!     → handed to lifecycle::startup
//! ```
//!
//! # Design Decisions
//! - Settings are immutable once loaded; changes require a restart
//! - All fields have defaults to allow an absent or minimal file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    EngineConfig, HttpConfig, LogFormat, LoggingConfig, MetricsConfig, NodeConfig, StateConfig, SyncConfig,
};
pub use validation::{validate_config, ValidationError};
