//! Config path resolution helpers.

use std::path::PathBuf;

use crate::error::{DepotError, Result};

pub const CONFIG_FILE_NAME: &str = "depot.toml";

/// `{config_dir}/depot/depot.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| DepotError::Config("could not determine config directory".to_string()))?;
    Ok(dir.join("depot").join(CONFIG_FILE_NAME))
}
