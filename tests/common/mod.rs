//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arch_node::engine::{Engine, EngineError, EngineRunner, StatsClient};
use arch_node::http::AppState;
use arch_node::lifecycle::Shutdown;
use arch_node::proxy::model::{Log, ProxyConfig};
use arch_node::state::StateStore;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Engine runner that records every restart instead of spawning a process.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    pub restarts: Arc<AtomicUsize>,
    pub configs: Arc<Mutex<Vec<ProxyConfig>>>,
}

impl RecordingRunner {
    pub fn count(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<ProxyConfig> {
        self.configs.lock().unwrap().last().cloned()
    }

    /// Poll until at least `expected` restarts were recorded.
    pub async fn wait_for(&self, expected: usize) {
        for _ in 0..200 {
            if self.count() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} restarts, saw {}", expected, self.count());
    }
}

impl EngineRunner for RecordingRunner {
    async fn restart(&mut self, config: &ProxyConfig) -> Result<(), EngineError> {
        self.configs.lock().unwrap().push(config.clone());
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Engine wrapper running the base config, already restarted once.
pub async fn start_engine(shutdown: &Shutdown) -> (Engine, RecordingRunner) {
    let runner = RecordingRunner::default();
    let (engine, _handle) = Engine::spawn(runner.clone(), shutdown.subscribe(), Duration::from_secs(1));
    let api_port = arch_node::net::allocate_free().unwrap();
    engine.init(api_port, Log::default());
    runner.wait_for(1).await;
    (engine, runner)
}

/// Initialized state store inside a fresh temp directory.
pub fn temp_store() -> (TempDir, Arc<StateStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StateStore::new(dir.path().join("database").join("app.json")));
    store.init().unwrap();
    (dir, store)
}

pub fn app_state(store: Arc<StateStore>, engine: Engine) -> AppState {
    AppState {
        store,
        engine,
        stats: StatsClient::new("/nonexistent/engine", Duration::from_secs(1)),
        client_name: "Arch-Manager".into(),
    }
}

/// One request seen by the mock manager.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Clone)]
struct MockState {
    config: Arc<Mutex<ProxyConfig>>,
    status: Arc<Mutex<StatusCode>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

/// Mock remote manager serving a programmable config at `{base}/api/configs`.
pub struct MockManager {
    pub addr: SocketAddr,
    state: MockState,
}

impl MockManager {
    pub async fn start(config: ProxyConfig) -> Self {
        let state = MockState {
            config: Arc::new(Mutex::new(config)),
            status: Arc::new(Mutex::new(StatusCode::OK)),
            requests: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new().fallback(serve_config).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    /// Manager base URL as a user would register it.
    pub fn url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn serve(&self, config: ProxyConfig) {
        *self.state.config.lock().unwrap() = config;
    }

    pub fn fail_with(&self, status: StatusCode) {
        *self.state.status.lock().unwrap() = status;
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn serve_config(State(state): State<MockState>, uri: Uri, headers: HeaderMap) -> Response {
    state.requests.lock().unwrap().push(Recorded {
        path: uri.path().to_string(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let status = *state.status.lock().unwrap();
    if status != StatusCode::OK {
        return status.into_response();
    }
    if uri.path() != "/api/configs" {
        return StatusCode::NOT_FOUND.into_response();
    }
    let config = state.config.lock().unwrap().clone();
    Json(config).into_response()
}
