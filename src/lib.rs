//! Node agent for an externally managed proxy engine.
//!
//! # Architecture Overview
//!
//! ```text
//!   Manager (remote)                          Local caller
//!        │ GET {url}/configs                       │ POST /v1/configs, /v1/manager
//!        ▼                                         ▼
//!   ┌──────────┐   equals?   ┌──────────┐    ┌──────────┐
//!   │   sync   │────────────▶│  engine  │◀───│   http   │
//!   │reconciler│   apply     │ (ArcSwap │    │  server  │
//!   └────┬─────┘             │ + actor) │    └────┬─────┘
//!        │                   └────┬─────┘         │
//!        ▼                        ▼               ▼
//!   ┌──────────┐             external engine  ┌──────────┐
//!   │  state   │◀────────────────────────────│  proxy   │ validate, compat
//!   │  store   │                              │  net     │ port conflicts
//!   └──────────┘                              └──────────┘
//! ```

// Domain model
pub mod net;
pub mod proxy;
pub mod state;

// Moving parts
pub mod engine;
pub mod http;
pub mod sync;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::NodeConfig;
pub use engine::Engine;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::ProxyConfig;
pub use state::StateStore;
