//! File configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. JSON config file (given explicitly or via REMOTECALL_CONFIG)
//! 3. Environment variables

use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Client configuration as stored on disk.
///
/// Keys are accepted in either case, so `{"Server": ..., "Rconpw": ...}`
/// files load unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server address as `host:port`.
    #[serde(alias = "Server")]
    pub server: String,
    /// Shared password sent in the handshake.
    #[serde(alias = "Password", alias = "rconpw", alias = "Rconpw")]
    pub password: String,
    /// Dial timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Read deadline in seconds, measured from the last successful read.
    pub read_timeout_secs: u64,
    /// Fixed delay before every reconnect, in seconds.
    pub reconnect_delay_secs: u64,
    /// How long a chunked send waits for its content length acknowledgement.
    pub negotiation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: String::new(),
            password: String::new(),
            connect_timeout_secs: 15,
            read_timeout_secs: 60,
            reconnect_delay_secs: 15,
            negotiation_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or REMOTECALL_CONFIG), then applies
    /// environment variable overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`] but without validation, for callers that apply
    /// further overrides of their own.
    pub fn read(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("REMOTECALL_CONFIG").ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(server) = var("REMOTECALL_SERVER") {
            self.server = server;
        }

        if let Some(password) = var("REMOTECALL_PASSWORD") {
            self.password = password;
        }

        if let Some(secs) = var("REMOTECALL_READ_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.read_timeout_secs = secs;
        }

        if let Some(secs) = var("REMOTECALL_RECONNECT_DELAY").and_then(|v| v.parse().ok()) {
            self.reconnect_delay_secs = secs;
        }
    }

    /// Checks that the configuration can drive a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.is_empty() {
            return Err(ConfigError::Validation(
                "server address not set".to_string(),
            ));
        }

        let port_ok = self
            .server
            .rsplit_once(':')
            .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
            .unwrap_or(false);
        if !port_ok {
            return Err(ConfigError::Validation(format!(
                "server address '{}' is not host:port",
                self.server
            )));
        }

        if self.read_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "read_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Builds the runtime session configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(&self.server, &self.password)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_read_timeout(Duration::from_secs(self.read_timeout_secs))
            .with_reconnect_delay(Duration::from_secs(self.reconnect_delay_secs))
            .with_negotiation_timeout(Duration::from_secs(self.negotiation_timeout_secs))
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
