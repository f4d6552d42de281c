//! Per-target advisory lock.
//!
//! One deployment at a time may run against a target directory. The lock file
//! lives outside the target (the target gets wiped) and is keyed by a hash of
//! the target's canonical path, so `..` or symlinked spellings of one target
//! share a lock. A held lock is rejected immediately rather than waited on.
//!
//! Lock files live under the caller's lock directory, so exclusion only holds
//! between runs that use the same one.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{DepotError, Result};
use crate::fs::resolve_path;

#[derive(Debug)]
pub struct DeployLock {
    file: File,
    path: PathBuf,
}

impl DeployLock {
    /// Take the exclusive lock for `target`, storing lock files in `lock_dir`.
    pub fn acquire(lock_dir: &Path, target: &Path) -> Result<Self> {
        fs::create_dir_all(lock_dir)
            .map_err(|e| DepotError::io(format!("create {}", lock_dir.display()), e))?;
        let path = lock_dir.join(format!("{}.lock", target_key(target)));

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| DepotError::io(format!("open {}", path.display()), e))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(DepotError::DeploymentInProgress(target.to_path_buf()));
            }
            return Err(DepotError::io(format!("lock {}", path.display()), e));
        }

        tracing::debug!(lock = %path.display(), target = %target.display(), "acquired deployment lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.path.display(), error = %e, "could not release deployment lock");
        }
    }
}

fn target_key(target: &Path) -> String {
    let hash = blake3::hash(resolve_path(target).to_string_lossy().as_bytes());
    hash.to_hex()[..32].to_string()
}
