//! Runs the external engine binary as a child process.
//!
//! # Responsibilities
//! - Write the configuration document where the engine reads it
//! - Stop the previous child before starting a new one
//! - Spawn `<binary> run -c <config>`

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::engine::{EngineError, EngineRunner};
use crate::proxy::model::ProxyConfig;

pub struct ProcessRunner {
    binary_path: PathBuf,
    config_path: PathBuf,
    stop_timeout: Duration,
    child: Option<Child>,
}

impl ProcessRunner {
    pub fn new(binary_path: impl Into<PathBuf>, config_path: impl Into<PathBuf>, stop_timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            config_path: config_path.into(),
            stop_timeout,
            child: None,
        }
    }

    async fn stop_child(&mut self) -> Result<(), EngineError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            tracing::warn!(status = %status, "Engine had already exited");
            return Ok(());
        }

        child.start_kill().map_err(EngineError::Stop)?;
        match timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(status = %status, "Engine process exited");
                Ok(())
            }
            Ok(Err(e)) => Err(EngineError::Stop(e)),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.stop_timeout.as_secs(),
                    "Engine process did not exit in time"
                );
                Ok(())
            }
        }
    }
}

async fn write_config(path: &Path, config: &ProxyConfig) -> Result<(), EngineError> {
    let write_err = |source| EngineError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }
    let content = serde_json::to_vec_pretty(config)?;
    tokio::fs::write(path, content).await.map_err(write_err)?;
    Ok(())
}

impl EngineRunner for ProcessRunner {
    async fn restart(&mut self, config: &ProxyConfig) -> Result<(), EngineError> {
        self.stop_child().await?;
        write_config(&self.config_path, config).await?;

        let child = Command::new(&self.binary_path)
            .arg("run")
            .arg("-c")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        tracing::debug!(
            pid = child.id().unwrap_or_default(),
            binary = %self.binary_path.display(),
            config = %self.config_path.display(),
            "Engine process spawned"
        );
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        self.stop_child().await
    }
}
