//! Configuration Loader
//!
//! Finds and parses the key configuration document.

use crate::config::schema::KeysConfig;
use crate::error::{KeywardError, Result};
use std::path::{Path, PathBuf};

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// None of the search paths exist
    NotFound,
}

/// Configuration loader with support for multiple locations
pub struct ConfigLoader {
    config: KeysConfig,
    source: ConfigSource,
}

impl ConfigLoader {
    /// Load from the first existing default location.
    ///
    /// Finding no file is not an error: the loader then holds an empty
    /// configuration with [`ConfigSource::NotFound`].
    pub fn new() -> Result<Self> {
        for path in Self::get_config_paths() {
            if path.exists() {
                return Self::from_path(&path);
            }
        }

        Ok(Self {
            config: KeysConfig::default(),
            source: ConfigSource::NotFound,
        })
    }

    /// Load a specific config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::load_from_file(path)?;

        Ok(Self {
            config,
            source: ConfigSource::File(path.to_path_buf()),
        })
    }

    /// Get list of config paths to check
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. Environment variable
        if let Ok(custom_path) = std::env::var("KEYWARD_CONFIG_PATH") {
            paths.push(PathBuf::from(custom_path));
        }

        // 2. Current directory
        paths.push(PathBuf::from("api_keys_config.json"));
        paths.push(PathBuf::from("keyward.json"));

        // 3. User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("keyward").join("api_keys_config.json"));
        }

        // 4. Home directory
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".keyward").join("api_keys_config.json"));
        }

        paths
    }

    fn load_from_file(path: &Path) -> Result<KeysConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KeywardError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            KeywardError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &KeysConfig {
        &self.config
    }

    /// Where the configuration came from
    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Take ownership of the configuration and its source
    pub fn into_parts(self) -> (KeysConfig, ConfigSource) {
        (self.config, self.source)
    }
}
