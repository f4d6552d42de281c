//! Config store for loading and saving depot.toml.

use std::path::{Path, PathBuf};

use super::{DepotConfig, parser, paths::default_config_path};
use crate::error::{DepotError, Result};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store at the platform config location.
    pub fn from_default_location() -> Result<Self> {
        Ok(Self::from_path(default_config_path()?))
    }

    pub fn from_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// A missing file yields the defaults.
    pub fn load(&self) -> Result<DepotConfig> {
        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "no config file; using defaults");
            return Ok(DepotConfig::new());
        }
        parser::parse_depot_toml(&self.config_path)
    }

    /// File, then `DEPOT_*` environment overrides, then validation.
    pub fn load_with_env(&self) -> Result<DepotConfig> {
        let mut config = self.load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &DepotConfig) -> Result<()> {
        let content = parser::to_toml(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DepotError::io(format!("create config directory {}", parent.display()), e)
            })?;
        }
        std::fs::write(&self.config_path, content).map_err(|e| {
            DepotError::io(format!("write config file {}", self.config_path.display()), e)
        })
    }
}
