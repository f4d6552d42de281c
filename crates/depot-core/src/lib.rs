//! Depot Core Library
//!
//! Packages per-terminal web releases out of master archives and deploys
//! them to a live service directory with backup, stop, replace and start.

pub mod archive;
pub mod backup;
pub mod config;
pub mod deploy;
pub mod error;
pub mod fetch;
pub mod fs;
pub mod replace;
pub mod resolve;
pub mod service;
pub mod store;
pub mod temp;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Errors
    pub use crate::error::{CleanupWarning, DepotError, Result};

    // Identifiers
    pub use crate::types::{Tag, TerminalId};

    // Configuration
    pub use crate::config::{ConfigStore, DepotConfig};

    // Archives
    pub use crate::archive::{SubsetSummary, extract_subset, extract_subset_to_temp};
    pub use crate::temp::{TempArtifact, with_temporary_artifact};

    // Deployment
    pub use crate::backup::BackupStore;
    pub use crate::deploy::{DeployFailure, DeployReport, DeploySettings, DeployStep, Deployer};
    pub use crate::fetch::{ArtifactFetcher, HttpArtifactFetcher};
    pub use crate::resolve::{
        ArtifactReference, ArtifactResolver, PathPrompt, Provenance, RemoteSource, ResolvePolicy,
    };
    pub use crate::service::{
        CommandServiceControl, NoopServiceControl, ServiceAction, ServiceControl, ServiceOutcome,
    };

    // Serving
    pub use crate::store::{ArtifactStore, StoredArtifact};

    pub use tokio_util::sync::CancellationToken;
}
