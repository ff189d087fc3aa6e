//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Node state → Metrics → Engine → Reconciler → HTTP listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → HTTP drains, Reconciler exits,
//!     engine stops within its grace period
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: state first, listener last
//! - Any startup error is fatal

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError};
