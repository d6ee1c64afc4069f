//! Configuration for tokengate.
//!
//! Settings come from a YAML file or from `TOKENGATE_*` environment
//! variables. The governance section is validated on load and handed to the
//! engine, which never changes it afterwards.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming a YAML settings file
pub const CONFIG_FILE_ENV: &str = "TOKENGATE_CONFIG_FILE";
/// Voting period in seconds
pub const VOTING_PERIOD_ENV: &str = "TOKENGATE_VOTING_PERIOD";
/// Quorum percentage (0-100)
pub const QUORUM_PERCENTAGE_ENV: &str = "TOKENGATE_QUORUM_PERCENTAGE";
/// Directory for file-backed proposal storage
pub const DATA_DIR_ENV: &str = "TOKENGATE_DATA_DIR";
/// Directory for rolling log files
pub const LOG_DIR_ENV: &str = "TOKENGATE_LOG_DIR";
/// Log level filter
pub const LOG_LEVEL_ENV: &str = "TOKENGATE_LOG_LEVEL";

/// Default voting period: 7 days
pub const DEFAULT_VOTING_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;
/// Default quorum: 30% of the outstanding membership supply
pub const DEFAULT_QUORUM_PERCENTAGE: u8 = 30;

/// Errors that can occur in configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidEnvVar(String, String),

    #[error("Failed to read file: {0}")]
    FileReadError(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Governance parameters, fixed at engine construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Length of the voting window in seconds
    #[serde(default = "default_voting_period_secs")]
    pub voting_period_secs: u64,
    /// Share of the total membership supply that must take part, in percent
    #[serde(default = "default_quorum_percentage")]
    pub quorum_percentage: u8,
}

fn default_voting_period_secs() -> u64 {
    DEFAULT_VOTING_PERIOD_SECS
}

fn default_quorum_percentage() -> u8 {
    DEFAULT_QUORUM_PERCENTAGE
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            voting_period_secs: DEFAULT_VOTING_PERIOD_SECS,
            quorum_percentage: DEFAULT_QUORUM_PERCENTAGE,
        }
    }
}

impl GovernanceConfig {
    /// Create a validated configuration
    pub fn new(voting_period_secs: u64, quorum_percentage: u8) -> ConfigResult<Self> {
        let config = Self {
            voting_period_secs,
            quorum_percentage,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the parameter ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.quorum_percentage > 100 {
            return Err(ConfigError::Invalid(format!(
                "quorum_percentage must be between 0 and 100, got {}",
                self.quorum_percentage
            )));
        }
        if self.voting_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "voting_period_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub governance: GovernanceConfig,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            governance: GovernanceConfig::default(),
            data_dir: None,
            log_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings from the environment.
    ///
    /// A file named by `TOKENGATE_CONFIG_FILE` takes precedence when it exists.
    pub fn from_env() -> ConfigResult<Self> {
        if let Ok(config_path) = env::var(CONFIG_FILE_ENV) {
            if Path::new(&config_path).exists() {
                return Self::from_file(&config_path);
            }
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(value) = lookup(VOTING_PERIOD_ENV) {
            settings.governance.voting_period_secs = parse_var(VOTING_PERIOD_ENV, &value)?;
        }
        if let Some(value) = lookup(QUORUM_PERCENTAGE_ENV) {
            settings.governance.quorum_percentage = parse_var(QUORUM_PERCENTAGE_ENV, &value)?;
        }
        settings.data_dir = lookup(DATA_DIR_ENV);
        settings.log_dir = lookup(LOG_DIR_ENV);
        if let Some(level) = lookup(LOG_LEVEL_ENV) {
            settings.log_level = level;
        }

        settings.governance.validate()?;
        debug!(?settings, "Loaded settings from environment");
        Ok(settings)
    }

    /// Load settings from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ConfigError::FileReadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let settings: Settings = serde_yaml::from_str(&contents)?;
        settings.governance.validate()?;
        debug!(path = %path.display(), "Loaded settings from file");
        Ok(settings)
    }

    /// Render the settings as YAML
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(name.to_string(), e.to_string()))
}
