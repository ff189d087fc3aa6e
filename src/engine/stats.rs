//! Statistics pass-through.
//!
//! Asks the engine binary to query its own stats service over the
//! loopback `api` inbound and hands the JSON back untouched.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;

use crate::engine::EngineError;

#[derive(Debug, Clone)]
pub struct StatsClient {
    binary_path: PathBuf,
    timeout: Duration,
}

impl StatsClient {
    pub fn new(binary_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout,
        }
    }

    /// Run `<binary> api statsquery --server=127.0.0.1:<api_port> [-reset]`.
    pub async fn query(&self, api_port: u16, reset: bool) -> Result<Value, EngineError> {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("api")
            .arg("statsquery")
            .arg(format!("--server=127.0.0.1:{}", api_port))
            .kill_on_drop(true);
        if reset {
            command.arg("-reset");
        }

        let output = match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(EngineError::Stats(e.to_string())),
            Err(_) => {
                return Err(EngineError::Stats(format!(
                    "timed out after {} seconds",
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Stats(format!(
                "exit status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_output(&output.stdout)
    }
}

fn parse_output(stdout: &[u8]) -> Result<Value, EngineError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(stdout).map_err(|e| EngineError::Stats(format!("unparseable output: {}", e)))
}
