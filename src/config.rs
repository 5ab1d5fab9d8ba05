//! Bridge Configuration
//!
//! Handles parsing and management of typed-array-bridge.toml configuration files.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for by [`BridgeConfig::find_and_load`]
pub const CONFIG_FILE_NAME: &str = "typed-array-bridge.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching typed-array-bridge.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BridgeConfig {
    /// Engine library location
    #[serde(default)]
    pub engine: EngineConfig,

    /// Typed array construction
    #[serde(default)]
    pub create: CreateConfig,
}

impl BridgeConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                log::debug!("[Config] Using {}", config_path.display());
                return Self::load(&config_path);
            }
            if !dir.pop() {
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Where to find the engine's shared library.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    /// Explicit library path or soname
    #[serde(default)]
    pub library: Option<PathBuf>,

    /// Directories searched before the platform defaults
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

/// How non-empty typed arrays are constructed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum CreateStrategy {
    /// Host allocates once and the engine adopts the bytes
    #[default]
    NoCopy,
    /// Engine allocates and the bytes are copied in
    EngineCopy,
}

/// Typed array construction settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CreateConfig {
    /// Construction strategy
    #[serde(default)]
    pub strategy: CreateStrategy,
}
