//! Durable node state persisted as a single JSON file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::ports::{self, PortError, ALLOCATION_RANGE};

/// Length of generated access tokens.
const TOKEN_LENGTH: usize = 32;

const MAX_MANAGER_URL_LENGTH: usize = 1024;
const MAX_MANAGER_TOKEN_LENGTH: usize = 128;

/// Errors from reading or writing the state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("State file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("State file is invalid: {0}")]
    Invalid(String),

    #[error("Could not allocate HTTP port: {0}")]
    Port(#[from] PortError),
}

/// Everything the node must remember across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeState {
    pub settings: Settings,
    #[serde(default)]
    pub manager: Option<Manager>,
}

/// Local HTTP API credentials, generated once on first run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub http_port: u16,
    pub http_token: String,
}

/// Reference to the remote control plane.
///
/// The token is optional; an empty one means requests go out without an
/// `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Manager {
    pub url: String,
    #[serde(default)]
    pub token: String,
}

impl Manager {
    /// URL must be absolute http(s) with a host. Both fields are length-capped.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.len() > MAX_MANAGER_URL_LENGTH {
            return Err(format!("url: must be at most {} characters", MAX_MANAGER_URL_LENGTH));
        }
        if self.token.len() > MAX_MANAGER_TOKEN_LENGTH {
            return Err(format!("token: must be at most {} characters", MAX_MANAGER_TOKEN_LENGTH));
        }
        let url = url::Url::parse(&self.url).map_err(|e| format!("url: {}", e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(format!("url: unsupported scheme '{}'", url.scheme()));
        }
        if url.host_str().is_none() {
            return Err("url: host is required".to_string());
        }
        Ok(())
    }
}

impl NodeState {
    /// Fresh state: random unprivileged port not bound on this host, random token.
    pub fn generate() -> Result<Self, StateError> {
        let mut http_port = fastrand::u16(ALLOCATION_RANGE);
        if !ports::is_free(http_port) {
            tracing::debug!(port = http_port, "Generated HTTP port is taken, allocating another");
            http_port = ports::allocate_free()?;
        }

        Ok(Self {
            settings: Settings {
                http_port,
                http_token: generate_token(),
            },
            manager: None,
        })
    }

    pub fn validate(&self) -> Result<(), StateError> {
        if self.settings.http_port == 0 {
            return Err(StateError::Invalid("settings.httpPort must be between 1 and 65535".into()));
        }
        if self.settings.http_token.trim().is_empty() {
            return Err(StateError::Invalid("settings.httpToken is required".into()));
        }
        if let Some(manager) = &self.manager {
            manager
                .validate()
                .map_err(|e| StateError::Invalid(format!("manager.{}", e)))?;
        }
        Ok(())
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Owner of [`NodeState`].
///
/// Every operation holds the store-wide lock for its whole duration, so
/// writes are linearized and a reader never sees a half-applied mutation.
/// Callers get copies, never references into the locked state.
pub struct StateStore {
    path: PathBuf,
    inner: Mutex<Option<NodeState>>,
}

impl StateStore {
    /// Create an empty store. Call [`StateStore::init`] before use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state file, or generate and persist defaults on first run.
    pub fn init(&self) -> Result<(), StateError> {
        let mut guard = self.lock();
        if self.path.exists() {
            *guard = Some(self.read()?);
            tracing::info!(path = %self.path.display(), "State loaded");
        } else {
            let state = NodeState::generate()?;
            self.write(&state)?;
            tracing::info!(
                path = %self.path.display(),
                http_port = state.settings.http_port,
                "State initialized with defaults"
            );
            *guard = Some(state);
        }
        Ok(())
    }

    /// Re-read and validate the state file, replacing the in-memory copy.
    pub fn load(&self) -> Result<(), StateError> {
        let mut guard = self.lock();
        *guard = Some(self.read()?);
        Ok(())
    }

    /// Persist the in-memory state.
    pub fn save(&self) -> Result<(), StateError> {
        let guard = self.lock();
        match guard.as_ref() {
            Some(state) => self.write(state),
            None => Err(StateError::Invalid("store is not initialized".into())),
        }
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> Option<NodeState> {
        self.lock().clone()
    }

    pub fn settings(&self) -> Option<Settings> {
        self.lock().as_ref().map(|s| s.settings.clone())
    }

    pub fn manager(&self) -> Option<Manager> {
        self.lock().as_ref().and_then(|s| s.manager.clone())
    }

    /// Set or clear the manager reference and persist.
    ///
    /// On a write failure the new value stays in memory and the error is
    /// returned so the caller can report the inconsistency.
    pub fn set_manager(&self, manager: Option<Manager>) -> Result<Option<Manager>, StateError> {
        if let Some(m) = &manager {
            m.validate().map_err(StateError::Invalid)?;
        }

        let mut guard = self.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| StateError::Invalid("store is not initialized".into()))?;
        state.manager = manager.clone();

        if let Err(e) = self.write(state) {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to persist manager change; keeping it in memory"
            );
            return Err(e);
        }

        tracing::info!(
            manager = manager.as_ref().map(|m| m.url.as_str()).unwrap_or("<none>"),
            "Manager updated"
        );
        Ok(manager)
    }

    fn lock(&self) -> MutexGuard<'_, Option<NodeState>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> Result<NodeState, StateError> {
        let content = fs::read_to_string(&self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;
        let state: NodeState = serde_json::from_str(&content)?;
        state.validate()?;
        Ok(state)
    }

    /// Write to a sibling temp file, then rename over the target.
    fn write(&self, state: &NodeState) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let content = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Manager {
        Manager {
            url: "https://m.example/api".to_string(),
            token: "t".to_string(),
        }
    }

    #[test]
    fn test_init_fresh_then_load_reproduces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database").join("app.json");

        let store = StateStore::new(&path);
        store.init().unwrap();
        assert!(path.exists());

        let first = store.snapshot().unwrap();
        assert!(first.settings.http_port > 0);
        assert!(ALLOCATION_RANGE.contains(&first.settings.http_port));
        assert_eq!(first.settings.http_token.len(), TOKEN_LENGTH);
        assert!(first.manager.is_none());

        let reloaded = StateStore::new(&path);
        reloaded.init().unwrap();
        assert_eq!(reloaded.snapshot().unwrap(), first);

        reloaded.load().unwrap();
        assert_eq!(reloaded.snapshot().unwrap(), first);
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        let store = StateStore::new(&path);
        store.init().unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(json["settings"]["httpPort"].is_u64());
        assert!(json["settings"]["httpToken"].is_string());
        assert!(json["manager"].is_null());
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, r#"{"settings": {"httpPort": 8080}}"#).unwrap();

        let store = StateStore::new(&path);
        assert!(matches!(store.init(), Err(StateError::Parse(_))));

        fs::write(&path, r#"{"settings": {"httpPort": 8080, "httpToken": ""}}"#).unwrap();
        assert!(matches!(store.init(), Err(StateError::Invalid(_))));
    }

    #[test]
    fn test_set_and_clear_manager_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        let store = StateStore::new(&path);
        store.init().unwrap();

        assert_eq!(store.set_manager(Some(manager())).unwrap(), Some(manager()));
        let other = StateStore::new(&path);
        other.init().unwrap();
        assert_eq!(other.manager(), Some(manager()));

        assert_eq!(store.set_manager(None).unwrap(), None);
        other.load().unwrap();
        assert!(other.manager().is_none());
    }

    #[test]
    fn test_set_manager_rejects_bad_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("app.json"));
        store.init().unwrap();

        let bad = Manager {
            url: "not a url".to_string(),
            token: "t".to_string(),
        };
        assert!(matches!(store.set_manager(Some(bad)), Err(StateError::Invalid(_))));
        assert!(store.manager().is_none());
    }

    #[test]
    fn test_uninitialized_store() {
        let store = StateStore::new("/nonexistent/app.json");
        assert!(store.settings().is_none());
        assert!(store.save().is_err());
        assert!(store.set_manager(None).is_err());
    }

    #[test]
    fn test_manager_validation() {
        assert!(manager().validate().is_ok());
        let ftp = Manager {
            url: "ftp://m.example".to_string(),
            token: "t".to_string(),
        };
        assert!(ftp.validate().is_err());
        let no_token = Manager {
            url: "https://m.example".to_string(),
            token: String::new(),
        };
        assert!(no_token.validate().is_ok());

        let long_token = Manager {
            url: "https://m.example".to_string(),
            token: "t".repeat(129),
        };
        assert!(long_token.validate().unwrap_err().starts_with("token:"));
        let long_url = Manager {
            url: format!("https://m.example/{}", "a".repeat(1024)),
            token: "t".to_string(),
        };
        assert!(long_url.validate().unwrap_err().starts_with("url:"));
    }

    #[test]
    fn test_manager_without_token_loads() {
        let manager: Manager = serde_json::from_str(r#"{"url":"https://m.example/api"}"#).unwrap();
        assert!(manager.token.is_empty());
        assert!(manager.validate().is_ok());
    }
}
