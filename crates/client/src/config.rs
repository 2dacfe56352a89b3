// Client configuration
//
// Loaded from TOML. Every field has a default, so a partial file (or none at
// all) is fine. Command-line flags override whatever is loaded here.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gridsync_protocol::{DEFAULT_PORT, MAX_LINE_BYTES};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Longest accepted inbound line.
    pub max_line_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 5000,
            max_line_bytes: MAX_LINE_BYTES,
        }
    }
}

impl ClientConfig {
    /// `<config dir>/gridsync/client.toml`, if the platform has a config dir.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gridsync").join("client.toml"))
    }

    pub fn from_toml(input: &str) -> Result<Self, ClientError> {
        toml::from_str(input).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    /// Load the default config file, falling back to defaults when it is absent.
    pub fn load_default() -> Result<Self, ClientError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
