//! Daemon configuration.
//!
//! Configuration is read from a TOML file:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! ping_interval_secs = 30
//! idle_timeout_secs = 90
//!
//! [dispatch]
//! offer_timeout_secs = 30
//! search_radius_m = 15000.0
//! finalize_retry_ms = 500
//!
//! [[providers]]
//! id = "tower-1"
//! name = "Downtown Towing"
//! kind = "Tower"
//! available = true
//! location = { latitude = 40.71, longitude = -74.0 }
//! ```
//!
//! Every section and key is optional; missing values fall back to defaults.
//! Zero durations are rejected, as is an idle timeout that does not exceed
//! the ping interval.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use towline_core::Provider;

use crate::server::{KeepAlive, IDLE_TIMEOUT, PING_INTERVAL};

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// Default time a tow truck has to answer an offer.
pub const DEFAULT_OFFER_TIMEOUT_SECS: u64 = 30;

/// Default candidate search radius (15 km).
pub const DEFAULT_SEARCH_RADIUS_M: f64 = 15_000.0;

/// Default delay between retries of a failed terminal write.
pub const DEFAULT_FINALIZE_RETRY_MS: u64 = 500;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TOWLINE_CONFIG";

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Invalid config {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid config {path}: {error}")]
    Invalid { path: PathBuf, error: String },
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
    /// Provider records loaded into the in-process store at startup.
    pub providers: Vec<Provider>,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub ping_interval_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            ping_interval_secs: PING_INTERVAL.as_secs(),
            idle_timeout_secs: IDLE_TIMEOUT.as_secs(),
        }
    }
}

impl ServerConfig {
    pub fn keep_alive(&self) -> KeepAlive {
        KeepAlive {
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }
}

/// `[dispatch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub offer_timeout_secs: u64,
    pub search_radius_m: f64,
    pub finalize_retry_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            offer_timeout_secs: DEFAULT_OFFER_TIMEOUT_SECS,
            search_radius_m: DEFAULT_SEARCH_RADIUS_M,
            finalize_retry_ms: DEFAULT_FINALIZE_RETRY_MS,
        }
    }
}

impl DispatchConfig {
    pub fn offer_timeout(&self) -> Duration {
        Duration::from_secs(self.offer_timeout_secs)
    }

    pub fn finalize_retry(&self) -> Duration {
        Duration::from_millis(self.finalize_retry_ms)
    }
}

impl DaemonConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate().map_err(|error| ConfigError::Invalid {
            path: origin.to_path_buf(),
            error,
        })?;
        Ok(config)
    }

    /// Checks values that parse but cannot work.
    pub fn validate(&self) -> Result<(), String> {
        if self.dispatch.offer_timeout_secs == 0 {
            return Err("dispatch.offer_timeout_secs must be at least 1".to_string());
        }
        if self.dispatch.finalize_retry_ms == 0 {
            return Err("dispatch.finalize_retry_ms must be at least 1".to_string());
        }
        if self.server.ping_interval_secs == 0 {
            return Err("server.ping_interval_secs must be at least 1".to_string());
        }
        if self.server.idle_timeout_secs <= self.server.ping_interval_secs {
            return Err("server.idle_timeout_secs must exceed server.ping_interval_secs".to_string());
        }
        Ok(())
    }

    /// Reads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Loads configuration.
    ///
    /// An explicit path must exist. Without one, the platform config file
    /// (`<config dir>/towline/config.toml`) is used if present, otherwise
    /// defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Platform default config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("towline").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use towline_core::ProviderKind;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::from_toml_str("", Path::new("inline")).unwrap();
        assert_eq!(config.server.listen.to_string(), DEFAULT_LISTEN);
        assert_eq!(config.dispatch.offer_timeout(), Duration::from_secs(30));
        assert_eq!(config.dispatch.search_radius_m, 15_000.0);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            [server]
            listen = "0.0.0.0:9000"

            [dispatch]
            offer_timeout_secs = 10
            finalize_retry_ms = 50

            [[providers]]
            id = "tower-1"
            name = "Downtown Towing"
            kind = "Tower"
            available = true
            location = { latitude = 40.71, longitude = -74.0 }
        "#;

        let config = DaemonConfig::from_toml_str(text, Path::new("inline")).unwrap();
        assert_eq!(config.server.listen.port(), 9000);
        assert_eq!(config.dispatch.offer_timeout_secs, 10);
        assert_eq!(config.dispatch.search_radius_m, DEFAULT_SEARCH_RADIUS_M);
        assert_eq!(config.dispatch.finalize_retry(), Duration::from_millis(50));

        let provider = &config.providers[0];
        assert_eq!(provider.kind, ProviderKind::Tower);
        assert!(provider.available);
        assert!(provider.earnings.is_zero());
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = DaemonConfig::from_toml_str("[server]\nlisten = 5", Path::new("/etc/towline.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("/etc/towline.toml"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("towline.toml");
        std::fs::write(&path, "[dispatch]\noffer_timeout_secs = 5\n").unwrap();

        let config = DaemonConfig::load(Some(&path)).unwrap();
        assert_eq!(config.dispatch.offer_timeout(), Duration::from_secs(5));
        assert_eq!(config.server.listen.to_string(), DEFAULT_LISTEN);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = DaemonConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_zero_offer_timeout_is_rejected() {
        let err = DaemonConfig::from_toml_str(
            "[dispatch]\noffer_timeout_secs = 0\n",
            Path::new("inline"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("offer_timeout_secs"));
    }

    #[test]
    fn test_idle_timeout_must_exceed_ping_interval() {
        let err = DaemonConfig::from_toml_str(
            "[server]\nping_interval_secs = 30\nidle_timeout_secs = 30\n",
            Path::new("inline"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let config = DaemonConfig::from_toml_str(
            "[server]\nping_interval_secs = 10\nidle_timeout_secs = 25\n",
            Path::new("inline"),
        )
        .unwrap();
        assert_eq!(config.server.keep_alive().ping_interval, Duration::from_secs(10));
        assert_eq!(config.server.keep_alive().idle_timeout, Duration::from_secs(25));
    }

    #[test]
    fn test_load_rejects_zero_offer_timeout_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("towline.toml");
        std::fs::write(&path, "[dispatch]\noffer_timeout_secs = 0\n").unwrap();

        let err = DaemonConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
