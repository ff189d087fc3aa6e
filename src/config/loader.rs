//! Settings loading from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::schema::NodeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for settings loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate settings from a TOML file. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<NodeConfig, ConfigError> {
    let config = match fs::read_to_string(path) {
        Ok(content) => parse_config(&content)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "Settings file not found, using defaults");
            NodeConfig::default()
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn parse_config(content: &str) -> Result<NodeConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogFormat;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("node.toml")).unwrap();
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.sync.interval_secs, 10);
        assert_eq!(config.state.path, "storage/database/app.json");
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(
            &path,
            r#"
[sync]
interval_secs = 3

[logging]
format = "json"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.sync.interval_secs, 3);
        assert_eq!(config.sync.request_timeout_secs, 10);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.engine.log_level, "warning");
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(&path, "[logging]\nformat = \"xml\"\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(&path, "[sync]\ninterval_secs = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().starts_with("Validation failed: sync.interval_secs"));
    }
}
