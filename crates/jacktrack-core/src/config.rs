//! Application configuration management.
//!
//! Configuration is read from a TOML file and layered with environment
//! overrides of the form `JACKTRACK__<SECTION>__<KEY>`, for example
//! `JACKTRACK__BLE__CONNECT_TIMEOUT_SECS=20`. Missing sections and keys fall
//! back to their defaults.
//!
//! ```toml
//! [ble]
//! scan_duration_ms = 5000
//! allow_duplicates = true
//! connect_timeout_secs = 10
//! suppress_system_alert = true
//!
//! [storage]
//! data_dir = "/var/lib/jacktrack"
//!
//! [server]
//! bind_address = "0.0.0.0"
//! port = 3000
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "JACKTRACK";

/// Longest scan window the configuration accepts.
pub const MAX_SCAN_DURATION_MS: u64 = 60_000;

/// Longest connect timeout the configuration accepts.
pub const MAX_CONNECT_TIMEOUT_SECS: u64 = 120;

static MAC_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("valid MAC address regex")
});

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file at the given path.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// The file exists but could not be read.
    #[error("Failed to read {path}: {source}")]
    ReadError {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("Failed to write {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The layered sources could not be parsed into a [`Config`].
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path, e.g. `ble.scan_duration_ms`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields are invalid.
    #[error("Configuration has {} invalid fields", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// BLE session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Default scan window in milliseconds.
    pub scan_duration_ms: u64,

    /// Report repeated advertisements from the same peripheral.
    pub allow_duplicates: bool,

    /// Time allowed for link establishment plus service resolution.
    pub connect_timeout_secs: u64,

    /// Suppress the platform's own "enable Bluetooth" dialog on start.
    pub suppress_system_alert: bool,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_duration_ms: 5000,
            allow_duplicates: true,
            connect_timeout_secs: 10,
            suppress_system_alert: true,
        }
    }
}

impl BleConfig {
    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Where persisted documents live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON file per document.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: crate::storage::default_data_dir(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: IpAddr,

    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 3000,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// BLE session settings.
    pub ble: BleConfig,

    /// Persistence settings.
    pub storage: StorageConfig,

    /// HTTP server settings.
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from `path`, layered with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file does not exist, a parse
    /// error if it is malformed, or validation errors.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_or_default(path)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults
    /// (still layered with environment overrides).
    ///
    /// # Errors
    ///
    /// Returns a parse error if the file is malformed, or validation errors.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let layered = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = layered.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to `path` as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Check every field and report all problems at once.
    ///
    /// # Errors
    ///
    /// Returns the single error, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.ble.scan_duration_ms == 0 || self.ble.scan_duration_ms > MAX_SCAN_DURATION_MS {
            errors.push(ConfigError::ValidationError {
                field: "ble.scan_duration_ms".into(),
                message: format!("must be between 1 and {MAX_SCAN_DURATION_MS}"),
            });
        }
        if self.ble.connect_timeout_secs == 0
            || self.ble.connect_timeout_secs > MAX_CONNECT_TIMEOUT_SECS
        {
            errors.push(ConfigError::ValidationError {
                field: "ble.connect_timeout_secs".into(),
                message: format!("must be between 1 and {MAX_CONNECT_TIMEOUT_SECS}"),
            });
        }
        if self.storage.data_dir.as_os_str().is_empty() {
            errors.push(ConfigError::ValidationError {
                field: "storage.data_dir".into(),
                message: "must not be empty".into(),
            });
        }
        if self.server.port == 0 {
            errors.push(ConfigError::ValidationError {
                field: "server.port".into(),
                message: "must not be 0".into(),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Default configuration file location.
    ///
    /// On Linux: `/etc/jacktrack/config.toml`
    /// Elsewhere: the platform config directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/jacktrack/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "jacktrack").map_or_else(
                || PathBuf::from("config.toml"),
                |dirs| dirs.config_dir().join("config.toml"),
            )
        }
    }
}

/// Returns `true` for a colon-separated MAC address such as `AA:BB:CC:DD:EE:FF`.
#[must_use]
pub fn is_valid_mac_address(address: &str) -> bool {
    MAC_ADDRESS.is_match(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ble.scan_duration_ms, 5000);
        assert_eq!(config.ble.connect_timeout(), Duration::from_secs(10));
        assert!(config.ble.suppress_system_alert);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_or_default(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.ble.scan_duration_ms, 5000);
        assert_eq!(config.ble.connect_timeout_secs, 10);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ble]\nconnect_timeout_secs = 25\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.ble.connect_timeout_secs, 25);
        assert!(config.ble.allow_duplicates);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.ble.allow_duplicates = false;
        config.storage.data_dir = dir.path().join("data");
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert!(!loaded.ble.allow_duplicates);
        assert_eq!(loaded.storage.data_dir, dir.path().join("data"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ble]\nsuppress_system_alert = true\n").unwrap();

        std::env::set_var("JACKTRACK__BLE__SUPPRESS_SYSTEM_ALERT", "false");
        let config = Config::load(&path);
        std::env::remove_var("JACKTRACK__BLE__SUPPRESS_SYSTEM_ALERT");

        assert!(!config.unwrap().ble.suppress_system_alert);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.ble.scan_duration_ms = 0;
        config.ble.connect_timeout_secs = 500;
        config.server.port = 0;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }

        let mut config = Config::default();
        config.ble.scan_duration_ms = MAX_SCAN_DURATION_MS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "ble.scan_duration_ms"
        ));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ble\nscan_duration_ms = ").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_mac_address_validation() {
        assert!(is_valid_mac_address("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac_address("aa:bb:cc:dd:ee:ff"));
        assert!(!is_valid_mac_address("AA:BB:CC:DD:EE"));
        assert!(!is_valid_mac_address("AA-BB-CC-DD-EE-FF"));
        assert!(!is_valid_mac_address(""));
    }
}
