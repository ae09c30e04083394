//! Configuration loading and resolution
//!
//! Bootstrap settings for the workflow client come from a small TOML file.
//! Every field has a compiled default, so a missing file is never fatal.
//!
//! # Resolution order
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable overriding the server base URL
pub const ENV_SERVER_URL: &str = "MAGI_SERVER_URL";

/// Environment variable pointing at an explicit config file
pub const ENV_CONFIG_PATH: &str = "MAGI_CONFIG";

/// Default pipeline server base URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

/// Default status polling period
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Upload size ceiling: 2 GiB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Default per-request timeout for the JSON endpoints
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Pipeline server base URL
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Status polling period in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive polling transport failures tolerated before giving up.
    ///
    /// `None` keeps polling indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_poll_failures: Option<u32>,

    /// Largest accepted upload in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Timeout for the JSON endpoints (the upload itself is not bounded)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Where downloaded output files are written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_failures: None,
            max_upload_bytes: default_max_upload_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
            download_dir: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Polling period as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(Error::Config("server_url must not be empty".to_string()));
        }
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server_url must start with http:// or https://: {}",
                self.server_url
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be greater than 0".to_string()));
        }
        if self.max_poll_failures == Some(0) {
            return Err(Error::Config(
                "max_poll_failures must be at least 1 (omit it to poll indefinitely)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load a TOML config file.
///
/// A missing file yields the compiled defaults with a warning; a file that
/// exists but does not parse is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write a config to disk, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Per-user config file location (`<config_dir>/magi/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("magi").join("config.toml"))
}

/// Pick the config file to read.
///
/// Priority: CLI argument, then `MAGI_CONFIG`, then the per-user default.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: OS-dependent default location
    default_config_path()
}

/// Resolve the full client configuration.
///
/// The TOML file supplies the base values; `server_url` can still be
/// overridden by the environment and then by the command line.
pub fn resolve_config(
    config_path: Option<&Path>,
    server_url_arg: Option<&str>,
) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(config_path) {
        Some(path) => load_toml_config(&path)?,
        None => {
            warn!("Could not determine config directory, using compiled defaults");
            TomlConfig::default()
        }
    };

    if let Some(url) = server_url_arg {
        debug!("server_url taken from command line");
        config.server_url = url.to_string();
    } else if let Ok(url) = std::env::var(ENV_SERVER_URL) {
        if !url.trim().is_empty() {
            debug!("server_url taken from {}", ENV_SERVER_URL);
            config.server_url = url;
        }
    }

    config.server_url = config.server_url.trim_end_matches('/').to_string();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.max_upload_bytes, 2_147_483_648);
        assert!(config.max_poll_failures.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str("poll_interval_ms = 500\n").unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = TomlConfig {
            poll_interval_ms: 0,
            ..TomlConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let config = TomlConfig {
            server_url: "ftp://example.com".to_string(),
            ..TomlConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_failure_cap() {
        let config = TomlConfig {
            max_poll_failures: Some(0),
            ..TomlConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
