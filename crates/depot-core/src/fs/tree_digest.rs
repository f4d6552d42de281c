//! Deterministic digest of a directory tree.
//!
//! Used to compare deployment targets across runs: two trees with the same
//! relative paths and file contents produce the same digest.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{DepotError, Result};

/// Compute a blake3 digest over a directory tree.
///
/// # Algorithm
/// - Recursive traversal, entries sorted by name at every level
/// - Directories contribute `rel_path || 0xFF`
/// - Files contribute `rel_path || 0x00 || content`
/// - Output: 64 hex chars
///
/// Symlinks and special files are rejected.
pub fn digest_tree(path: &Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    digest_dir(&mut hasher, path, "")?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn digest_dir(hasher: &mut blake3::Hasher, dir: &Path, base: &str) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| DepotError::io(format!("read {}", dir.display()), e))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| DepotError::io(format!("read {}", dir.display()), e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let rel_path = if base.is_empty() {
            name.to_string_lossy().into_owned()
        } else {
            format!("{}/{}", base, name.to_string_lossy())
        };
        let path = entry.path();
        let ty = entry
            .file_type()
            .map_err(|e| DepotError::io(format!("stat {}", path.display()), e))?;

        if ty.is_dir() {
            hasher.update(rel_path.as_bytes());
            hasher.update(&[0xFF]);
            digest_dir(hasher, &path, &rel_path)?;
        } else if ty.is_file() {
            hasher.update(rel_path.as_bytes());
            hasher.update(&[0x00]);
            let mut file = fs::File::open(&path)
                .map_err(|e| DepotError::io(format!("open {}", path.display()), e))?;
            io::copy(&mut file, hasher)
                .map_err(|e| DepotError::io(format!("read {}", path.display()), e))?;
        } else {
            return Err(DepotError::io(
                format!("digest {}", path.display()),
                io::Error::other("symlinks and special files are not supported"),
            ));
        }
    }

    Ok(())
}
