//! Wipe a directory's contents and repopulate it from an archive.

use std::fs;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::archive::unpack_archive;
use crate::error::{CleanupWarning, DepotError, Result};

/// Result of a successful replacement.
#[derive(Debug, Default)]
pub struct ReplaceReport {
    /// Files written from the archive.
    pub files_written: usize,
    /// Children of the destination that could not be removed.
    pub warnings: Vec<CleanupWarning>,
}

/// Delete every immediate child of `dir`, recursively.
///
/// Failures are collected rather than raised; a stale file must never block a
/// deployment. Creates `dir` when it does not exist.
pub fn clear_directory(dir: &Path) -> Result<Vec<CleanupWarning>> {
    fs::create_dir_all(dir).map_err(|e| DepotError::io(format!("create {}", dir.display()), e))?;

    let entries =
        fs::read_dir(dir).map_err(|e| DepotError::io(format!("read {}", dir.display()), e))?;

    let mut warnings = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warnings.push(CleanupWarning::new(dir, e.to_string()));
                continue;
            }
        };
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let removed = if is_dir {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = removed {
            let kind = if is_dir { "directory" } else { "file" };
            tracing::warn!(path = %path.display(), error = %e, "could not delete {kind}");
            warnings.push(CleanupWarning::new(path, e.to_string()));
        }
    }
    Ok(warnings)
}

/// Replace the contents of `dest` with the contents of `archive`.
///
/// The archive must exist and `cancel` must be live before anything is
/// deleted. Per-child delete failures become warnings; extraction failures
/// are returned as errors and may leave `dest` partially populated.
pub fn replace_directory_contents(
    dest: &Path,
    archive: &Path,
    cancel: &CancellationToken,
) -> Result<ReplaceReport> {
    if !archive.is_file() {
        return Err(DepotError::not_found(format!(
            "archive to deploy {}",
            archive.display()
        )));
    }

    if cancel.is_cancelled() {
        return Err(DepotError::Cancelled);
    }

    let warnings = clear_directory(dest)?;
    let files_written = unpack_archive(archive, dest, cancel)?;

    Ok(ReplaceReport {
        files_written,
        warnings,
    })
}
