//! Local port allocation and inbound conflict resolution.
//!
//! # Responsibilities
//! - Probe whether a port can be bound on this host
//! - Pick a random free port from a bounded range
//! - Reject candidate inbounds whose ports are taken by unrelated listeners
//!
//! # Design Decisions
//! - Probing binds the wildcard address, which conflicts with any listener
//!   on a specific address too
//! - The `api` inbound's port is never caller-controlled; it is always
//!   replaced with a fresh free port
//! - The `remote` inbound may keep a busy port only if the running
//!   configuration already owns it under the same tag

use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;

use crate::proxy::model::{Inbound, ProxyConfig, API_TAG, REMOTE_TAG};

/// Range random allocations are drawn from (outside the privileged range).
pub const ALLOCATION_RANGE: RangeInclusive<u16> = 10_000..=65_000;

/// Give up after this many random probes.
pub const MAX_ATTEMPTS: usize = 100;

/// Error type for port operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    /// No bindable port found in the allocation range.
    Exhausted { attempts: usize },
    /// A candidate inbound asks for a port held by an unrelated listener.
    Conflict { tag: String, port: u16 },
}

impl std::fmt::Display for PortError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortError::Exhausted { attempts } => {
                write!(f, "No free port found after {} attempts", attempts)
            }
            PortError::Conflict { tag, port } => {
                write!(f, "Inbound '{}': port {} is already in use", tag, port)
            }
        }
    }
}

impl std::error::Error for PortError {}

/// Whether `port` can currently be bound on all interfaces.
pub fn is_free(port: u16) -> bool {
    if port == 0 {
        return false;
    }
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}

/// A random bindable port from [`ALLOCATION_RANGE`].
pub fn allocate_free() -> Result<u16, PortError> {
    allocate_free_except(&[])
}

/// Like [`allocate_free`] but never returns one of `excluded`.
pub fn allocate_free_except(excluded: &[u16]) -> Result<u16, PortError> {
    for _ in 0..MAX_ATTEMPTS {
        let port = fastrand::u16(ALLOCATION_RANGE);
        if excluded.contains(&port) {
            continue;
        }
        if is_free(port) {
            return Ok(port);
        }
    }
    tracing::warn!(attempts = MAX_ATTEMPTS, "Port allocation exhausted");
    Err(PortError::Exhausted {
        attempts: MAX_ATTEMPTS,
    })
}

/// Check candidate inbounds against the host and the running configuration.
///
/// The `api` inbound is rewritten in place with a freshly allocated port.
pub fn resolve_inbound_conflicts(candidates: &mut [Inbound], current: &ProxyConfig) -> Result<(), PortError> {
    for inbound in candidates.iter_mut() {
        match inbound.tag.as_str() {
            API_TAG => {
                let requested = inbound.port;
                inbound.port = allocate_free_except(&[requested])?;
                tracing::debug!(requested, assigned = inbound.port, "Reassigned api inbound port");
            }
            REMOTE_TAG => {
                let owned = current
                    .find_inbound(REMOTE_TAG)
                    .is_some_and(|running| running.port == inbound.port);
                if !owned && !is_free(inbound.port) {
                    return Err(PortError::Conflict {
                        tag: inbound.tag.clone(),
                        port: inbound.port,
                    });
                }
            }
            _ => {
                if !is_free(inbound.port) {
                    return Err(PortError::Conflict {
                        tag: inbound.tag.clone(),
                        port: inbound.port,
                    });
                }
            }
        }
    }
    Ok(())
}
