//! Bearer token check for `/v1` routes.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::http::response::ApiError;
use crate::http::server::AppState;

pub async fn require_token(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state
        .store
        .settings()
        .map(|s| s.http_token)
        .ok_or(ApiError::Unauthorized)?;

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if tokens_match(token, &expected) => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized),
    }
}

/// Comparison time depends only on the lengths.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
