//! Configuration management for weightlog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::aggregate::OrderPolicy;
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "weightlog";

/// Default client log file name.
const CLIENT_LOG_FILE_NAME: &str = "user_info.log";

/// Largest chart edge accepted, in pixels.
const MAX_CHART_DIMENSION: u32 = 8192;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `WEIGHTLOG_`, sections split on `__`)
/// 2. TOML config file at `~/.config/weightlog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Aggregation configuration.
    pub aggregation: AggregationConfig,
    /// Chart configuration.
    pub chart: ChartConfig,
    /// Client info configuration.
    pub client_info: ClientInfoConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the web server binds to.
    pub bind_address: String,
}

/// Which [`RecordStore`](crate::storage::RecordStore) adapter to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Flat CSV file.
    #[default]
    Csv,
    /// `SQLite` database.
    Sqlite,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl StorageBackend {
    /// Default file name for this backend.
    #[must_use]
    pub fn default_file_name(self) -> &'static str {
        match self {
            Self::Csv => "weights.csv",
            Self::Sqlite => "weights.db",
        }
    }
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend.
    pub backend: StorageBackend,
    /// Path to the store.
    /// Defaults to `~/.local/share/weightlog/weights.csv` (or `weights.db`).
    pub data_path: Option<PathBuf>,
}

/// Aggregation-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// How first and last measurements are chosen for change summaries.
    pub order: OrderPolicy,
}

/// How a rendered chart reaches the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartOutput {
    /// Embedded in the page as a base64 data URI.
    #[default]
    Inline,
    /// Written under the static directory and linked by URL.
    File,
}

/// Chart-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Chart width in pixels.
    pub width: u32,
    /// Chart height in pixels.
    pub height: u32,
    /// Inline or file output.
    pub output: ChartOutput,
    /// Directory served under `/static`.
    /// Defaults to `~/.local/share/weightlog/static`.
    pub static_dir: Option<PathBuf>,
}

/// Client info configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientInfoConfig {
    /// Look up a location for the client address.
    pub geolocation_enabled: bool,
    /// Lookup endpoint; the client IP is appended.
    pub lookup_url: String,
    /// Timeout for the lookup request in milliseconds.
    pub timeout_ms: u64,
    /// Path to the append-only client log.
    /// Defaults to `~/.local/share/weightlog/user_info.log`.
    pub log_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5000".to_string(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 600,
            output: ChartOutput::Inline,
            static_dir: None,
        }
    }
}

impl Default for ClientInfoConfig {
    fn default() -> Self {
        Self {
            geolocation_enabled: true,
            lookup_url: "http://ip-api.com/json/".to_string(),
            timeout_ms: 3000,
            log_path: None,
        }
    }
}

impl Config {
    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("WEIGHTLOG_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        self.bind_address()?;

        for (name, value) in [("width", self.chart.width), ("height", self.chart.height)] {
            if value == 0 || value > MAX_CHART_DIMENSION {
                return Err(Error::ConfigValidation {
                    message: format!(
                        "chart {name} must be between 1 and {MAX_CHART_DIMENSION} (got {value})"
                    ),
                });
            }
        }

        if self.client_info.timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "client_info.timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.client_info.lookup_url.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "client_info.lookup_url must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Parse the configured bind address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid socket address.
    pub fn bind_address(&self) -> Result<SocketAddr> {
        self.server
            .bind_address
            .parse()
            .map_err(|e| Error::ConfigValidation {
                message: format!(
                    "invalid bind address '{}': {e}",
                    self.server.bind_address
                ),
            })
    }

    /// Get the store path, resolving defaults if not set.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.storage.data_path.clone().unwrap_or_else(|| {
            Self::default_data_dir().join(self.storage.backend.default_file_name())
        })
    }

    /// Get the static directory, resolving defaults if not set.
    #[must_use]
    pub fn static_dir(&self) -> PathBuf {
        self.chart
            .static_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("static"))
    }

    /// Get the client log path, resolving defaults if not set.
    #[must_use]
    pub fn client_log_path(&self) -> PathBuf {
        self.client_info
            .log_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(CLIENT_LOG_FILE_NAME))
    }

    /// Get the lookup timeout as a Duration.
    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.client_info.timeout_ms)
    }
}
