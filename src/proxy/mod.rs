//! Proxy engine configuration subsystem.
//!
//! # Data Flow
//! ```text
//! JSON document (local API body / manager response)
//!     → model.rs (typed ProxyConfig, serde)
//!     → validation.rs (required fields, tag references, credentials)
//!     → compat.rs (protocol × transport × security legality)
//!     → engine (atomic swap + restart)
//!
//! Programmatic configs:
//!     builders.rs (protocol fragments) + stream.rs (transport + security)
//!     → compat.rs::sanitize (repair instead of reject)
//! ```
//!
//! # Design Decisions
//! - Protocol, transport and security are independent fragments; legality
//!   lives in compat.rs, not in the type shapes
//! - Equality is defined on the canonical serialized form
//! - Validation collects every error, not just the first

pub mod builders;
pub mod compat;
pub mod model;
pub mod stream;
pub mod validation;

pub use compat::{check_compatible, check_config, sanitize, sanitize_config, IncompatibleError};
pub use model::{
    Inbound, Outbound, Protocol, ProxyConfig, API_TAG, REMOTE_TAG,
};
pub use stream::{Network, Security, StreamSettings};
pub use validation::{validate, ValidationError, ValidationErrors};
