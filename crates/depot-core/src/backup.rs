//! Backup snapshots of a deployment target.
//!
//! Snapshots are zip files named `backup_{yyyyMMdd_HHmmss}.zip` (UTC) inside a
//! dedicated directory. The name sorts by time so the newest snapshot is
//! lexicographically last. The directory is never pruned here.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::archive::pack_directory;
use crate::error::{DepotError, Result};

const PREFIX: &str = "backup_";
const EXTENSION: &str = ".zip";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive `target` into a new snapshot and return its path.
    pub fn snapshot(&self, target: &Path) -> Result<PathBuf> {
        self.snapshot_at(target, Utc::now())
    }

    pub(crate) fn snapshot_at(&self, target: &Path, at: DateTime<Utc>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| DepotError::io(format!("create {}", self.dir.display()), e))?;
        let path = self.next_name(at);
        let entries = pack_directory(target, &path)?;
        tracing::debug!(path = %path.display(), entries, "wrote backup snapshot");
        Ok(path)
    }

    /// Snapshot paths, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DepotError::io(format!("read {}", self.dir.display()), e)),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DepotError::io(format!("read {}", self.dir.display()), e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(PREFIX) && name.ends_with(EXTENSION) && entry.path().is_file() {
                snapshots.push(entry.path());
            }
        }
        snapshots.sort();
        Ok(snapshots)
    }

    /// The most recent snapshot, if any.
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.list()?.pop())
    }

    /// Pick a file name for a snapshot taken at `at` that does not exist yet.
    ///
    /// Two snapshots within the same second get a `_NNN` counter, which sorts
    /// after the bare name because `_` follows `.` in ASCII.
    fn next_name(&self, at: DateTime<Utc>) -> PathBuf {
        let stamp = at.format(TIMESTAMP_FORMAT).to_string();
        let first = self.dir.join(format!("{PREFIX}{stamp}{EXTENSION}"));
        if !first.exists() {
            return first;
        }
        let mut counter = 1u32;
        loop {
            let candidate = self
                .dir
                .join(format!("{PREFIX}{stamp}_{counter:03}{EXTENSION}"));
            if !candidate.exists() {
                return candidate;
            }
            counter += 1;
        }
    }
}
