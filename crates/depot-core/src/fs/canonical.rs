//! Path canonicalization for directories that may not exist yet.

use std::path::{Component, Path, PathBuf};

/// Resolve `path` to an absolute form with symlinks and `..` removed.
///
/// The deepest existing ancestor goes through `fs::canonicalize`; components
/// below it are appended lexically.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let lexical = normalize(&absolute);

    let mut existing = lexical.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(resolved) = std::fs::canonicalize(existing) {
            return rest.iter().rev().fold(resolved, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}

/// Whether `path` is `base` or lies below it, after resolving both.
pub fn is_within(path: &Path, base: &Path) -> bool {
    resolve_path(path).starts_with(resolve_path(base))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
