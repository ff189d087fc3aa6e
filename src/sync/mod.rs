//! Remote manager synchronization subsystem.
//!
//! # Data Flow
//! ```text
//! Timer tick
//!     → StateStore::manager (none → skip)
//!     → manager.rs (GET {url}/configs, bearer token, bounded timeout)
//!     → compat::sanitize_config + validate
//!     → ProxyConfig::equals(running)
//!     → Engine::apply on change
//! ```

pub mod manager;
pub mod reconciler;

pub use manager::{ManagerClient, SyncError};
pub use reconciler::{Reconciler, SyncOutcome};
