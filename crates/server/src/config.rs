// Coordinator configuration
//
// Same layering as the client: TOML file with per-field defaults, then
// command-line overrides in main.rs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use gridsync_protocol::{DEFAULT_PORT, MAX_LINE_BYTES};

use crate::error::ServerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on.
    pub bind: String,
    /// 0 picks a free port.
    pub port: u16,
    /// Where `<sheet>.json` documents live.
    pub data_dir: PathBuf,
    /// Registered users, one per line. Relative paths resolve against `data_dir`.
    pub users_file: PathBuf,
    pub max_line_bytes: usize,
    /// Consecutive malformed lines tolerated before a client is dropped.
    pub max_parse_failures: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from("spreadsheets"),
            users_file: PathBuf::from("users"),
            max_line_bytes: MAX_LINE_BYTES,
            max_parse_failures: 3,
        }
    }
}

impl ServerConfig {
    /// `<config dir>/gridsync/server.toml`, if the platform has a config dir.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gridsync").join("server.toml"))
    }

    pub fn from_toml(input: &str) -> Result<Self, ServerError> {
        toml::from_str(input).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    /// Load the default config file, falling back to defaults when it is absent.
    pub fn load_default() -> Result<Self, ServerError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(&self.users_file)
    }

    pub fn sheet_path(&self, sheet: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", sheet))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:2112");
        assert_eq!(config.users_path(), Path::new("spreadsheets/users"));
        assert_eq!(config.sheet_path("budget"), Path::new("spreadsheets/budget.json"));
        assert_eq!(config.max_parse_failures, 3);
    }

    #[test]
    fn test_partial_file() {
        let config = ServerConfig::from_toml("data_dir = \"/srv/sheets\"\nport = 0\n").unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.users_path(), Path::new("/srv/sheets/users"));
        assert_eq!(config.max_line_bytes, MAX_LINE_BYTES);
    }

    #[test]
    fn test_absolute_users_file() {
        let config = ServerConfig::from_toml("users_file = \"/etc/gridsync/users\"\n").unwrap();
        assert_eq!(config.users_path(), Path::new("/etc/gridsync/users"));
    }

    #[test]
    fn test_bad_file() {
        assert!(matches!(
            ServerConfig::from_toml("max_parse_failures = -1"),
            Err(ServerError::Config(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(ServerConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
