use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::GatewayConfig;

/// Errors that can occur when loading or persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to parse service map '{path}': {source}")]
    DocumentParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize service map: {0}")]
    SerializeError(#[source] serde_json::Error),

    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl GatewayConfig {
    /// Returns the default path of the gateway configuration file.
    ///
    /// Uses `~/.config/bluegreen/gateway.toml` on Unix/macOS, or the
    /// equivalent from `dirs::config_dir()` elsewhere. Falls back to the
    /// current directory if no config directory is available.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("bluegreen").join("gateway.toml")
    }

    /// Loads configuration from the default config file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from `path`.
    ///
    /// - If the file doesn't exist, returns `GatewayConfig::default()`.
    /// - Otherwise parses it as TOML and validates.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Gateway config not found, using defaults");
            return Ok(GatewayConfig::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: GatewayConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - Both bind addresses parse as socket addresses
    /// - Timeouts are non-zero
    /// - The health path is absolute
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, addr) in [
            ("proxy.bind_addr", &self.proxy.bind_addr),
            ("admin.bind_addr", &self.admin.bind_addr),
        ] {
            if addr.parse::<SocketAddr>().is_err() {
                return Err(ConfigError::ValidationError {
                    message: format!("{label} '{addr}' is not a valid socket address"),
                });
            }
        }

        let upstream = &self.upstream;
        if upstream.connect_timeout_seconds == 0 || upstream.response_header_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError {
                message: "upstream timeouts must be greater than zero".to_string(),
            });
        }

        if self.health.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError {
                message: "health.timeout_seconds must be greater than zero".to_string(),
            });
        }

        if !self.health.path.starts_with('/') {
            return Err(ConfigError::ValidationError {
                message: format!("health.path '{}' must start with '/'", self.health.path),
            });
        }

        if self.services_file.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "services_file must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
