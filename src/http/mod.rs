//! Local HTTP API subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, body limit, tracing)
//!     → auth.rs (bearer token against the persisted node token, /v1 only)
//!     → handlers.rs (decode, validate, apply)
//!     → response.rs (errors → status + JSON message)
//! ```

pub mod auth;
pub mod handlers;
pub mod response;
pub mod server;

pub use response::ApiError;
pub use server::{build_router, AppState, HttpServer, APP_NAME_HEADER};
