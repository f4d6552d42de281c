//! Server-side artifact store layout.
//!
//! ```text
//! {root}/{tag}.zip                 master archive, one top-level folder per terminal
//! {root}/{terminal}/{tag}.zip      pre-packaged archive for one terminal
//! ```

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{DepotError, Result};
use crate::types::{Tag, TerminalId};

/// An archive found in the store for a terminal and tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredArtifact {
    /// Ready to serve as is.
    Packaged(PathBuf),
    /// Master archive; the terminal's subset must be extracted first.
    Master(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Prefer a pre-packaged archive, then the master archive.
    pub fn locate(&self, terminal: &TerminalId, tag: &Tag) -> Result<StoredArtifact> {
        let packaged = self.root.join(terminal.as_str()).join(tag.archive_name());
        if is_archive(&packaged)? {
            return Ok(StoredArtifact::Packaged(packaged));
        }

        let master = self.root.join(tag.archive_name());
        if is_archive(&master)? {
            return Ok(StoredArtifact::Master(master));
        }

        Err(DepotError::not_found(format!("no release '{tag}' for terminal '{terminal}'")))
    }
}

/// A missing path is simply absent; any other stat failure is reported.
fn is_archive(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            Ok(false)
        }
        Err(e) => Err(DepotError::io(format!("stat {}", path.display()), e)),
    }
}
