//! Archive a directory tree into a zip file.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{DepotError, Result};

/// Archive every file and directory below `source` into `dest`.
///
/// Entry names are relative to `source` with forward slashes; directories are
/// stored as placeholder entries so empty directories survive a round trip.
/// An existing `dest` is replaced. On failure the partial `dest` is removed.
///
/// Returns the number of entries written.
pub fn pack_directory(source: &Path, dest: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Err(DepotError::not_found(format!(
            "source directory {}",
            source.display()
        )));
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| DepotError::io(format!("create {}", parent.display()), e))?;
    }

    match write_archive(source, dest) {
        Ok(count) => Ok(count),
        Err(err) => {
            if let Err(e) = fs::remove_file(dest) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %dest.display(), error = %e, "could not remove partial archive");
                }
            }
            Err(err)
        }
    }
}

fn write_archive(source: &Path, dest: &Path) -> Result<usize> {
    let file = File::create(dest)
        .map_err(|e| DepotError::io(format!("create {}", dest.display()), e))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let mut count = 0;
    add_dir_recursive(&mut writer, source, "", dest, &mut count)?;
    let mut inner = writer.finish().map_err(|e| DepotError::zip(dest, e))?;
    io::Write::flush(&mut inner)
        .map_err(|e| DepotError::io(format!("flush {}", dest.display()), e))?;
    Ok(count)
}

fn add_dir_recursive(
    writer: &mut ZipWriter<BufWriter<File>>,
    dir: &Path,
    base: &str,
    dest: &Path,
    count: &mut usize,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| DepotError::io(format!("read {}", dir.display()), e))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| DepotError::io(format!("read {}", dir.display()), e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        let rel = if base.is_empty() {
            name.to_string_lossy().into_owned()
        } else {
            format!("{}/{}", base, name.to_string_lossy())
        };

        let ty = entry
            .file_type()
            .map_err(|e| DepotError::io(format!("stat {}", path.display()), e))?;
        if ty.is_symlink() && path.is_dir() {
            tracing::warn!(path = %path.display(), "skipping directory symlink");
            continue;
        }
        let metadata = fs::metadata(&path)
            .map_err(|e| DepotError::io(format!("stat {}", path.display()), e))?;
        let options = entry_options(&metadata);

        if metadata.is_dir() {
            writer
                .add_directory(format!("{rel}/"), options)
                .map_err(|e| DepotError::zip(dest, e))?;
            *count += 1;
            add_dir_recursive(writer, &path, &rel, dest, count)?;
        } else {
            writer
                .start_file(rel, options)
                .map_err(|e| DepotError::zip(dest, e))?;
            let mut input = File::open(&path)
                .map_err(|e| DepotError::io(format!("open {}", path.display()), e))?;
            io::copy(&mut input, writer)
                .map_err(|e| DepotError::io(format!("archive {}", path.display()), e))?;
            *count += 1;
        }
    }
    Ok(())
}

fn entry_options(metadata: &fs::Metadata) -> SimpleFileOptions {
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .large_file(metadata.len() >= u32::MAX as u64);
    #[cfg(unix)]
    let options = {
        use std::os::unix::fs::PermissionsExt;
        options.unix_permissions(metadata.permissions().mode())
    };
    options
}
