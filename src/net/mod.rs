//! Host network probing.
//!
//! # Data Flow
//! ```text
//! Candidate config (local API)
//!     → ports.rs (bindability probe per inbound)
//!     → api inbound re-addressed, conflicts rejected
//!     → Hand off to engine
//!
//! Startup:
//!     StateStore first run → ports.rs::allocate_free (HTTP port)
//!     Engine init          → ports.rs::allocate_free (api port)
//! ```
//!
//! # Design Decisions
//! - Probes are point-in-time; a port can be taken between check and use
//! - Allocation is random within a bounded range, with a bounded attempt count

pub mod ports;

pub use ports::{allocate_free, is_free, resolve_inbound_conflicts, PortError};
