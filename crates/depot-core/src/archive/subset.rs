//! Carve one terminal's subtree out of a master archive.
//!
//! A master archive holds one top-level folder per terminal:
//!
//! ```text
//! A/x.txt
//! A/sub/y.txt
//! B/z.txt
//! ```
//!
//! Extracting prefix `A` yields a new archive with `x.txt` and `sub/y.txt`.
//! Entries are copied raw, so compressed payloads are never inflated and
//! re-deflated. Selection is purely by path prefix; entries outside the
//! prefix are never read.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::{is_placeholder, normalize_entry_name};
use crate::error::{DepotError, Result};
use crate::temp::TempArtifact;

/// Outcome of a successful subset extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsetSummary {
    /// Entries under the prefix, placeholders included.
    pub matched: usize,
    /// Entries written to the output archive.
    pub written: usize,
}

/// Write every entry of `source` under `prefix/` into `dest`, prefix removed.
///
/// Fails with `NotFound` when `source` is missing or nothing matched. On any
/// failure the partially written `dest` is deleted before the error returns.
pub fn extract_subset(
    source: &Path,
    prefix: &str,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<SubsetSummary> {
    match copy_matching(source, prefix, dest, cancel) {
        Ok(summary) => {
            tracing::debug!(
                source = %source.display(),
                prefix,
                matched = summary.matched,
                written = summary.written,
                "extracted archive subset"
            );
            Ok(summary)
        }
        Err(err) => {
            if let Err(e) = fs::remove_file(dest) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %dest.display(), error = %e, "could not remove partial subset archive");
                }
            }
            Err(err)
        }
    }
}

/// Like [`extract_subset`], writing into a fresh temporary artifact in `temp_dir`.
///
/// The returned artifact deletes its file when dropped.
pub fn extract_subset_to_temp(
    source: &Path,
    prefix: &str,
    temp_dir: &Path,
    cancel: &CancellationToken,
) -> Result<(TempArtifact, SubsetSummary)> {
    let artifact = TempArtifact::new_in(temp_dir, "subset", "zip");
    let summary = extract_subset(source, prefix, artifact.path(), cancel)?;
    Ok((artifact, summary))
}

fn copy_matching(
    source: &Path,
    prefix: &str,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<SubsetSummary> {
    let file = File::open(source)
        .map_err(|e| DepotError::io(format!("archive {}", source.display()), e))?;
    let mut archive =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| DepotError::zip(source, e))?;

    let selector = format!("{}/", normalize_entry_name(prefix).trim_end_matches('/'));

    let out = File::create(dest)
        .map_err(|e| DepotError::io(format!("create {}", dest.display()), e))?;
    let mut writer = zip::ZipWriter::new(BufWriter::new(out));

    let mut matched = 0;
    let mut written = 0;
    let mut seen = HashSet::new();

    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(DepotError::Cancelled);
        }
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| DepotError::zip(source, e))?;
        let name = normalize_entry_name(entry.name());
        let Some(relative) = name.strip_prefix(&selector) else {
            continue;
        };
        matched += 1;

        if entry.is_dir() || is_placeholder(relative) {
            continue;
        }
        if !seen.insert(relative.to_string()) {
            tracing::warn!(entry = %name, "skipping duplicate archive entry");
            continue;
        }

        writer
            .raw_copy_file_rename(entry, relative.to_string())
            .map_err(|e| DepotError::zip(dest, e))?;
        written += 1;
    }

    if matched == 0 {
        return Err(DepotError::not_found(format!("no entries under '{selector}'")));
    }

    let mut inner = writer.finish().map_err(|e| DepotError::zip(dest, e))?;
    inner
        .flush()
        .map_err(|e| DepotError::io(format!("flush {}", dest.display()), e))?;

    Ok(SubsetSummary { matched, written })
}
