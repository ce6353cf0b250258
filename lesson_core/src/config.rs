//! Configuration file support.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/lessons/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    pub fn intent_log_path(&self) -> PathBuf {
        self.data_dir.join("intents.wal")
    }
}

/// Playback and completion parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_completion_tolerance")]
    pub completion_tolerance_seconds: f64,

    #[serde(default = "default_playback_rate")]
    pub default_playback_rate: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            completion_tolerance_seconds: default_completion_tolerance(),
            default_playback_rate: default_playback_rate(),
        }
    }
}

impl PlaybackConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lessons")
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_completion_tolerance() -> f64 {
    crate::library::COMPLETION_TOLERANCE_SECONDS
}

fn default_playback_rate() -> f64 {
    1.0
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values the playback controller cannot work with
    pub fn validate(&self) -> Result<()> {
        let playback = &self.playback;
        if !(0.0..=10.0).contains(&playback.completion_tolerance_seconds) {
            return Err(Error::Config(format!(
                "completion_tolerance_seconds must be within 0..=10, got {}",
                playback.completion_tolerance_seconds
            )));
        }
        if !(crate::playback::MIN_PLAYBACK_RATE..=crate::playback::MAX_PLAYBACK_RATE)
            .contains(&playback.default_playback_rate)
        {
            return Err(Error::Config(format!(
                "default_playback_rate out of range: {}",
                playback.default_playback_rate
            )));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lessons")
            .join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
