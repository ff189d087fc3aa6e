//! Durable node state subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     state file exists?  → store.rs::load (parse + validate, fatal on error)
//!     otherwise           → generate defaults → save
//!
//! Local API (POST /v1/manager):
//!     → store.rs::set_manager (lock → mutate → save)
//!
//! Reconciler tick:
//!     → store.rs::manager (copy out under lock)
//! ```
//!
//! # Design Decisions
//! - One store-wide lock; every read copies out while holding it
//! - Single write path; writes go through a temp file + rename
//! - A malformed state file aborts startup rather than being overwritten

pub mod store;

pub use store::{Manager, NodeState, Settings, StateError, StateStore};
