//! HTTP client for the remote manager.

use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::StatusCode;
use thiserror::Error;

use crate::proxy::model::ProxyConfig;
use crate::proxy::validation::ValidationErrors;
use crate::state::Manager;

/// Reasons a reconciliation cycle is abandoned.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Manager request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Manager returned status {0}")]
    Status(StatusCode),

    #[error("Manager returned an unparseable config: {0}")]
    Decode(serde_json::Error),

    #[error("Manager returned an invalid config: {0}")]
    Invalid(ValidationErrors),
}

/// Fetches the authoritative configuration.
#[derive(Debug, Clone)]
pub struct ManagerClient {
    http: reqwest::Client,
}

impl ManagerClient {
    /// Every request is bounded by `timeout`, connect included.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    /// `GET {url}/configs`, with bearer auth when a token is set.
    pub async fn fetch_config(&self, manager: &Manager) -> Result<ProxyConfig, SyncError> {
        let url = configs_url(&manager.url);
        tracing::debug!(url = %url, "Fetching config from manager");

        let mut request = self
            .http
            .get(&url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if !manager.token.is_empty() {
            request = request.bearer_auth(&manager.token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(SyncError::Decode)
    }
}

pub fn configs_url(base: &str) -> String {
    format!("{}/configs", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configs_url() {
        assert_eq!(configs_url("https://m.example/api"), "https://m.example/api/configs");
        assert_eq!(configs_url("https://m.example/api/"), "https://m.example/api/configs");
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::Status(StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Manager returned status 401 Unauthorized");
    }

    #[tokio::test]
    async fn test_unreachable_manager() {
        let client = ManagerClient::new(Duration::from_millis(500)).unwrap();
        let manager = Manager {
            url: "http://127.0.0.1:1".to_string(),
            token: "t".to_string(),
        };
        let err = client.fetch_config(&manager).await.unwrap_err();
        assert!(matches!(err, SyncError::Request(_)));
    }
}
