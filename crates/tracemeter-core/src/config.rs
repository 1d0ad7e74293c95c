//! Configuration management for Tracemeter
//!
//! Values are layered: built-in defaults, then a TOML file, then
//! `TRACEMETER__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::models::{AlertThresholds, NotificationChannel};

/// Prefix of the environment variables that override the configuration
pub const ENV_PREFIX: &str = "TRACEMETER";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Platform API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Alerting configuration
    #[serde(default)]
    pub alerting: AlertingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, `config.toml` in the
    /// platform config directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(dotenv) = dotenvy::dotenv() {
            debug!(path = %dotenv.display(), "Loaded .env file");
        }

        Self::load_layers(path, default_config_path())
    }

    /// Layer defaults, the explicit file or the optional `fallback` file,
    /// and the environment
    fn load_layers(path: Option<&Path>, fallback: Option<PathBuf>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        match (path, fallback) {
            (Some(path), _) => {
                debug!(path = %path.display(), "Loading configuration file");
                builder = builder.add_source(config::File::from(path).required(true));
            }
            (None, Some(path)) => {
                debug!(path = %path.display(), "Looking for configuration file");
                builder = builder.add_source(config::File::from(path).required(false));
            }
            (None, None) => {}
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}

/// `config.toml` in the platform config directory
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "tracemeter").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Platform API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the platform
    pub host: String,
    /// Public key (basic auth user)
    pub public_key: Option<String>,
    /// Secret key (basic auth password)
    pub secret_key: Option<String>,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Records requested per page
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:3000".to_string(),
            public_key: None,
            secret_key: None,
            timeout: Duration::from_secs(30),
            page_size: 50,
        }
    }
}

/// Alerting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Thresholds checked by `monitor`.
    ///
    /// Without a `[alerting.thresholds]` table the production thresholds
    /// apply. With one, only the thresholds it sets are checked.
    pub thresholds: Option<AlertThresholds>,
    /// Where triggered alerts are delivered
    pub channels: Vec<NotificationChannel>,
    /// Timeout for notification requests
    #[serde(with = "humantime_serde")]
    pub notification_timeout: Duration,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            thresholds: None,
            channels: Vec::new(),
            notification_timeout: Duration::from_secs(30),
        }
    }
}

impl AlertingConfig {
    /// Thresholds in effect
    pub fn active_thresholds(&self) -> AlertThresholds {
        self.thresholds
            .clone()
            .unwrap_or_else(AlertThresholds::production)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
