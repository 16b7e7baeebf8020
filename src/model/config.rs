use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error type for config loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse catchup.toml: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Configuration from catchup.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub undo: UndoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoConfig {
    /// How long the undo toast stays up before the action finalizes
    #[serde(default = "default_toast_duration_ms")]
    pub toast_duration_ms: u64,
}

impl Default for UndoConfig {
    fn default() -> Self {
        UndoConfig {
            toast_duration_ms: 10_000,
        }
    }
}

fn default_toast_duration_ms() -> u64 {
    10_000
}

impl UndoConfig {
    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }
}

impl AppConfig {
    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(toml::from_str(&text)?)
    }
}
