//! Console configuration management

use crate::feed::FeedOrder;
use serde::{Deserialize, Serialize};
use sniffy_common::constants;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sniffy")
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sniffy")
    }
}

/// Get the config file path
pub fn config_file() -> PathBuf {
    config_dir().join("console.yml")
}

/// Console configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Auditor web interface (default: https://127.0.0.1:8005)
    #[serde(default = "default_auditor_url")]
    pub auditor_url: String,

    /// Proxy server used when the navigation hash names none
    #[serde(default = "default_proxy_server")]
    pub proxy_server: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Port of the local console
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default)]
    pub feed_order: FeedOrder,

    /// Upper bound for every auditor request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// The auditor serves a self-signed certificate
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

fn default_auditor_url() -> String {
    "https://127.0.0.1:8005".to_string()
}

fn default_proxy_server() -> String {
    "1".to_string()
}

fn default_poll_interval_ms() -> u64 {
    constants::DEFAULT_POLL_INTERVAL_MS
}

fn default_listen_port() -> u16 {
    4050
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_accept_invalid_certs() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auditor_url: default_auditor_url(),
            proxy_server: default_proxy_server(),
            poll_interval_ms: default_poll_interval_ms(),
            listen_port: default_listen_port(),
            feed_order: FeedOrder::default(),
            request_timeout_secs: default_request_timeout_secs(),
            accept_invalid_certs: default_accept_invalid_certs(),
        }
    }
}

impl Config {
    /// Load config from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file())
    }

    /// Load config from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).map_err(io_err)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sniffy-config-{}-{}", std::process::id(), name))
            .join("console.yml")
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.auditor_url, "https://127.0.0.1:8005");
        assert_eq!(config.proxy_server, "1");
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.listen_port, 4050);
        assert_eq!(config.feed_order, FeedOrder::NewestFirst);
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn test_missing_file() {
        let config = Config::load_from(&scratch("missing")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file() {
        let config: Config =
            serde_yaml::from_str("proxy_server: \"3\"\nfeed_order: oldest_first\n").unwrap();
        assert_eq!(config.proxy_server, "3");
        assert_eq!(config.feed_order, FeedOrder::OldestFirst);
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn test_round_trip() {
        let path = scratch("round-trip");
        let config = Config {
            auditor_url: "https://auditor.local:9000".to_string(),
            poll_interval_ms: 250,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_parse_error_names_file() {
        let path = scratch("broken");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "listen_port: [not, a, port]").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("console.yml"));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
