//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::RetryPolicy;
use crate::notify::NotifierConfig;
use crate::parse_duration;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "*".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

/// Season defaults and countdown cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonConfig {
    /// Length of a season started without an end time (e.g. "7d", "36h")
    #[serde(default = "default_season_duration")]
    pub default_duration: String,

    /// Countdown monitor tick in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

fn default_season_duration() -> String {
    "7d".to_string()
}

fn default_tick_interval() -> u64 {
    1000
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self {
            default_duration: default_season_duration(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl SeasonConfig {
    /// The default season length, if the configured string parses.
    pub fn season_length(&self) -> Option<chrono::Duration> {
        parse_duration(&self.default_duration).and_then(|d| chrono::Duration::from_std(d).ok())
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms)
    }
}

/// Retry settings for conflicting document writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_backoff")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay() -> u64 {
    10
}

fn default_backoff() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            backoff_multiplier: default_backoff(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_retries: config.max_retries,
            initial_delay_ms: config.initial_delay_ms,
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// TOML roster of player names and teams
    #[serde(default)]
    pub directory_file: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub season: SeasonConfig,

    #[serde(default)]
    pub notifications: NotifierConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            directory_file: None,
            server: ServerConfig::default(),
            season: SeasonConfig::default(),
            notifications: NotifierConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        match self.season.season_length() {
            Some(length) if length > chrono::Duration::zero() => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid season duration: {:?}",
                    self.season.default_duration
                )))
            }
        }

        if self.season.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Tick interval must be greater than 0".to_string(),
            ));
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "Backoff multiplier must be at least 1.0".to_string(),
            ));
        }

        if let NotifierConfig::Webhook {
            url,
            timeout_seconds,
        } = &self.notifications
        {
            let parsed = url::Url::parse(url).map_err(|e| {
                ConfigError::ValidationError(format!("Invalid webhook URL {:?}: {}", url, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::ValidationError(format!(
                    "Webhook URL must be http or https: {}",
                    url
                )));
            }
            if *timeout_seconds == 0 {
                return Err(ConfigError::ValidationError(
                    "Webhook timeout must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}
