//! # Application State

use std::path::{Path, PathBuf};

use depot_core::config::ServerConfig;
use depot_core::store::ArtifactStore;

/// Shared state passed to all route handlers. Read-only per request.
#[derive(Debug, Clone)]
pub struct AppState {
    store: Option<ArtifactStore>,
    temp_dir: PathBuf,
}

impl AppState {
    pub fn new(store_root: Option<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: store_root.map(ArtifactStore::new),
            temp_dir: temp_dir.into(),
        }
    }

    /// Subset archives are extracted under the system temp directory.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.store_root.clone(),
            std::env::temp_dir().join("depot-server"),
        )
    }

    pub fn store(&self) -> Option<&ArtifactStore> {
        self.store.as_ref()
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}
