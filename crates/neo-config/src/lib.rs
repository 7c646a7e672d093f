//! Configuration management for the NEO HAT daemon
//!
//! Handles HAT revision profiles and daemon settings, stored as TOML.

mod profiles;
mod settings;

pub use profiles::{
    ButtonPin, ButtonRole, HatProfile, Revision, SensorProfile, ShutdownPolicy, load_hat_profiles,
};
pub use settings::{AdminConfig, DaemonSettings};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Standard configuration directory
pub const CONFIG_DIR: &str = "/etc/neo-hat";

/// Longest period any timing setting may be configured to
pub const MAX_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Main daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HatConfig {
    #[serde(default)]
    pub daemon: DaemonSettings,

    #[serde(default)]
    pub admin: AdminConfig,
}

impl HatConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> Result<Self, ConfigError> {
        let system_config = Path::new(CONFIG_DIR).join("config.toml");
        if system_config.exists() {
            return Self::load(&system_config);
        }

        // Return default config if no file exists
        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject settings the runtime cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        let daemon = &self.daemon;
        if daemon.led_cycle_ms == 0 {
            return Err(ConfigError::Invalid("led_cycle_ms must be positive".into()));
        }
        let admin_timeout = ("admin.timeout_secs", self.admin.timeout());
        for (name, period) in daemon.periods().into_iter().chain([admin_timeout]) {
            if period > MAX_PERIOD {
                return Err(ConfigError::Invalid(format!(
                    "{} must not exceed {}s",
                    name,
                    MAX_PERIOD.as_secs()
                )));
            }
        }
        if daemon.shutdown_percent > daemon.warning_percent {
            return Err(ConfigError::Invalid(format!(
                "shutdown_percent ({}) must not exceed warning_percent ({})",
                daemon.shutdown_percent, daemon.warning_percent
            )));
        }
        if daemon.warning_percent > 100 {
            return Err(ConfigError::Invalid("warning_percent must be 0-100".into()));
        }
        Ok(())
    }

    /// Profile for the configured revision, preferring custom profiles from
    /// `config_dir`
    pub fn profile(&self, config_dir: &Path) -> Result<Option<HatProfile>, ConfigError> {
        if self.daemon.revision == Revision::None {
            return Ok(None);
        }
        let mut profiles = load_hat_profiles(config_dir)?;
        Ok(profiles.remove(&self.daemon.revision))
    }
}
