//! Zip archive operations.
//!
//! - [`subset`]: carve one terminal's subtree out of a master archive
//! - [`pack`]: archive a directory tree (backup snapshots)
//! - [`unpack`]: extract an archive into a directory (deploy and restore)

pub mod pack;
pub mod subset;
pub mod unpack;

use std::path::{Component, Path, PathBuf};

pub use pack::pack_directory;
pub use subset::{SubsetSummary, extract_subset, extract_subset_to_temp};
pub use unpack::unpack_archive;

/// Normalize an entry name to forward-slash form.
pub fn normalize_entry_name(name: &str) -> String {
    name.replace('\\', "/")
}

/// True for directory placeholder entries (empty or trailing separator).
pub fn is_placeholder(normalized: &str) -> bool {
    normalized.is_empty() || normalized.ends_with('/')
}

/// Convert a normalized entry name into a path that stays below its root.
///
/// Returns `None` for absolute names, drive prefixes and any `..` component.
pub fn entry_relative_path(normalized: &str) -> Option<PathBuf> {
    let trimmed = normalized.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        return None;
    }
    let path = Path::new(trimmed);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}
