//! Player Configuration
//! Handles saving and loading of player settings

use crate::audio::MAX_FRAMES;
use crate::effect::EffectKind;
use crate::error::ConfigError;
use crate::params::SettlePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_SETTLE_INTERVAL_MS: u64 = 500;
const DEFAULT_BLOCK_FRAMES: usize = 512;

/// Get config directory path
fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("isolator"))
}

/// Get config file path
fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|p| p.join("config.json"))
}

/// Complete player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Delay between a load and the parameter refresh
    pub settle_interval_ms: u64,
    /// Effect inserted between player and output
    pub effect_kind: EffectKind,
    /// Render quantum of the offline output
    pub block_frames: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            settle_interval_ms: DEFAULT_SETTLE_INTERVAL_MS,
            effect_kind: EffectKind::SOUND_ISOLATION,
            block_frames: DEFAULT_BLOCK_FRAMES,
        }
    }
}

impl PlayerConfig {
    /// Load configuration from the user config directory
    pub fn load() -> Self {
        match get_config_path() {
            Some(path) => Self::load_from(path),
            None => {
                info!("could not determine config path, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from `path`, falling back to defaults
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no config file found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match Self::from_json_str(&content) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse config");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read config");
                Self::default()
            }
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: PlayerConfig = serde_json::from_str(content)?;
        Ok(config.normalized())
    }

    /// Save configuration to the user config directory
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = get_config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(path)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        info!(path = %path.display(), "saved configuration");
        Ok(())
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn settle_policy(&self) -> SettlePolicy {
        SettlePolicy::new(self.settle_interval())
    }

    fn normalized(mut self) -> Self {
        self.block_frames = self.block_frames.clamp(1, MAX_FRAMES);
        self
    }
}
