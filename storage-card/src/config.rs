//! Transaction manager configuration
//!
//! Loaded from JSON. `load_default` checks the `STORAGECARD_CONFIG`
//! environment variable first, then `<config dir>/storagecard/config.json`.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Deserialize;

use crate::error::{Result, StorageCardError};

/// Settings shared by every transaction manager created with them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionConfig {
    /// Valid reader key slots are `0..key_storage_capacity`
    pub key_storage_capacity: u8,
    /// Overrides the product's re-authentication policy when set
    pub reauth_on_sector_switch: Option<bool>,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            key_storage_capacity: Self::DEFAULT_KEY_STORAGE_CAPACITY,
            reauth_on_sector_switch: None,
        }
    }
}

impl TransactionConfig {
    const DEFAULT_KEY_STORAGE_CAPACITY: u8 = 32;
    const ENV_VAR: &'static str = "STORAGECARD_CONFIG";
    const DEFAULT_FILE: &'static str = "config.json";

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StorageCardError::Config(e.to_string()))
    }

    /// Read a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| StorageCardError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&content)?;
        info!("Loaded transaction config from {:?}", path);
        Ok(config)
    }

    /// Default config file location
    fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(Self::ENV_VAR) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("storagecard").join(Self::DEFAULT_FILE))
    }

    /// Load from the default location, falling back to defaults when no file exists
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No transaction config file, using defaults");
                Ok(Self::default())
            }
        }
    }
}
