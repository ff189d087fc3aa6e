//! Request handlers for the local API.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::engine::EngineError;
use crate::http::response::ApiError;
use crate::http::server::{AppState, APP_NAME_HEADER};
use crate::net::resolve_inbound_conflicts;
use crate::proxy::compat::check_config;
use crate::proxy::model::ProxyConfig;
use crate::proxy::validation::validate;
use crate::state::Manager;

#[derive(Serialize)]
pub struct NodeIdentity {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn get_root() -> Json<NodeIdentity> {
    Json(NodeIdentity {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

/// `POST /v1/configs`: replace the running configuration.
///
/// Checks run in order: parse (400), field validation and compatibility
/// (422), caller identity (400), port conflicts (422).
pub async fn post_configs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let mut config: ProxyConfig =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("Malformed config: {}", e)))?;

    validate(&config)?;
    check_config(&config)?;

    let client = headers
        .get(APP_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if client != &*state.client_name {
        return Err(ApiError::BadRequest(format!("Unexpected client '{}'", client)));
    }

    let current = state.engine.config();
    resolve_inbound_conflicts(&mut config.inbounds, &current)?;

    if config.metadata.is_none() {
        config.stamp("api");
    }

    tracing::info!(
        inbounds = config.inbounds.len(),
        outbounds = config.outbounds.len(),
        "Accepted config from local API"
    );
    state.engine.apply(config, "api");

    Ok(Json(json!({ "message": "The configs stored successfully." })))
}

/// Body of `POST /v1/manager`. Missing fields read as empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ManagerRequest {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ManagerResponse {
    pub manager: Option<Manager>,
}

/// `POST /v1/manager`: register or clear the remote manager.
pub async fn post_manager(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ManagerResponse>), ApiError> {
    let manager = parse_manager(&body)?;
    if let Some(m) = &manager {
        m.validate().map_err(ApiError::Unprocessable)?;
    }

    let manager = state.store.set_manager(manager)?;
    Ok((StatusCode::CREATED, Json(ManagerResponse { manager })))
}

/// Empty body, `null`, `{}` or an empty `url` clears, whatever the token.
fn parse_manager(body: &[u8]) -> Result<Option<Manager>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let request: Option<ManagerRequest> =
        serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Malformed manager: {}", e)))?;

    Ok(request
        .filter(|r| !r.url.trim().is_empty())
        .map(|r| Manager {
            url: r.url,
            token: r.token,
        }))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub reset: bool,
}

/// `GET /v1/stats`: engine statistics pass-through.
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, ApiError> {
    let api_port = state.engine.config().api_port().ok_or(EngineError::NotRunning)?;
    let stats = state.stats.query(api_port, query.reset).await?;
    Ok(Json(stats))
}
