//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit, auth)
//! - Bind server to listener and stop on the shared shutdown signal

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, MatchedPath, Request};
use axum::http::header::HeaderName;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::HttpConfig;
use crate::engine::{Engine, StatsClient};
use crate::http::{auth, handlers};
use crate::observability::metrics;
use crate::state::StateStore;

/// Header naming the client pushing a configuration.
pub const APP_NAME_HEADER: &str = "x-app-name";

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub engine: Engine,
    pub stats: StatsClient,
    /// Expected `X-App-Name` on config pushes.
    pub client_name: Arc<str>,
}

/// HTTP server for the local API.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &HttpConfig, state: AppState) -> Self {
        Self {
            router: build_router(config, state),
        }
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &HttpConfig, state: AppState) -> Router {
    let v1 = Router::new()
        .route("/configs", post(handlers::post_configs))
        .route("/manager", post(handlers::post_manager))
        .route("/stats", get(handlers::get_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_token));

    Router::new()
        .route("/", get(handlers::get_root))
        .nest("/v1", v1)
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get(&X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        }))
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
}

async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(request).await;
    metrics::record_api_request(&endpoint, response.status().as_u16());
    response
}
