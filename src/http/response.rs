//! Error responses.
//!
//! # Design Decisions
//! - Every failure becomes `{"message": ...}`; validation failures also
//!   carry the per-field list
//! - Persistence and engine failures are logged in full and reported to
//!   the caller as a short summary

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::engine::EngineError;
use crate::net::PortError;
use crate::proxy::compat::IncompatibleError;
use crate::proxy::validation::ValidationErrors;
use crate::state::StateError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed body or unexpected client identity.
    #[error("{0}")]
    BadRequest(String),

    #[error("Missing or invalid token")]
    Unauthorized,

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// Single-field rejection outside of document validation.
    #[error("{0}")]
    Unprocessable(String),

    #[error(transparent)]
    Incompatible(#[from] IncompatibleError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Persistence(#[from] StateError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) | ApiError::Unprocessable(_) | ApiError::Incompatible(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Port(PortError::Conflict { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Port(PortError::Exhausted { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Engine(EngineError::Stats(_) | EngineError::NotRunning) => StatusCode::BAD_GATEWAY,
            ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Persistence(_) => "Failed to persist node state".to_string(),
            ApiError::Engine(EngineError::Stats(_) | EngineError::NotRunning) => {
                "Engine statistics are unavailable".to_string()
            }
            ApiError::Engine(_) => "Engine control failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = match &self {
            ApiError::Validation(errors) => {
                let fields: Vec<_> = errors
                    .errors()
                    .iter()
                    .map(|e| json!({ "field": e.field, "message": e.message }))
                    .collect();
                json!({ "message": self.message(), "errors": fields })
            }
            _ => json!({ "message": self.message() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Port(PortError::Conflict { tag: "in".into(), port: 443 }).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Port(PortError::Exhausted { attempts: 100 }).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Engine(EngineError::Stats("dial".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Persistence(StateError::Invalid("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_not_leaked() {
        let err = ApiError::Engine(EngineError::Stats("/opt/xray: exit status 1".into()));
        assert_eq!(err.message(), "Engine statistics are unavailable");
    }
}
