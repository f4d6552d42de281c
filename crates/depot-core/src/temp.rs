//! Transient files that are deleted exactly once when their owner goes away.
//!
//! A [`TempArtifact`] owns a uniquely named path in a shared temporary
//! directory. The name carries a random UUID so concurrent users of the same
//! directory never collide; no directory-level locking is involved. Dropping
//! the artifact removes the file, which covers normal return, early return via
//! `?`, panics, and a dropped future.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{DepotError, Result};

#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    /// Reserve a unique path in `dir`. The file itself is not created.
    pub fn new_in(dir: &Path, prefix: &str, extension: &str) -> Self {
        let name = format!("{}_{}.{}", prefix, uuid::Uuid::new_v4().simple(), extension);
        Self {
            path: dir.join(name),
            armed: true,
        }
    }

    /// Reserve a unique path in the system temporary directory.
    pub fn new(prefix: &str, extension: &str) -> Self {
        Self::new_in(&std::env::temp_dir(), prefix, extension)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the backing file for reading.
    pub fn open(&self) -> Result<File> {
        File::open(&self.path)
            .map_err(|e| DepotError::io(format!("open {}", self.path.display()), e))
    }

    /// Keep the file on disk and hand its path to the caller.
    pub fn persist(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed temporary artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "could not remove temporary artifact"
            ),
        }
    }
}

/// Produce a transient file, hand a read handle to `consumer`, then delete it.
///
/// `producer` populates the reserved path. The file is removed after
/// `consumer` returns, whether it succeeded, failed or panicked, and also when
/// `producer` fails after a partial write. Deletion failures are logged only.
pub fn with_temporary_artifact<T, P, C>(dir: &Path, producer: P, consumer: C) -> Result<T>
where
    P: FnOnce(&Path) -> Result<()>,
    C: FnOnce(File) -> Result<T>,
{
    let artifact = TempArtifact::new_in(dir, "depot", "tmp");
    producer(artifact.path())?;
    let file = artifact.open()?;
    consumer(file)
}
