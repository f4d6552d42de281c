//! Extract a zip archive into a directory.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::{entry_relative_path, is_placeholder, normalize_entry_name};
use crate::error::{DepotError, Result};

/// Extract every entry of `archive` below `dest`, recreating relative paths.
///
/// Existing files are overwritten. Entries whose names would escape `dest`
/// are skipped with a warning. `cancel` is checked between entries.
///
/// Returns the number of files written.
pub fn unpack_archive(archive: &Path, dest: &Path, cancel: &CancellationToken) -> Result<usize> {
    let file = File::open(archive)
        .map_err(|e| DepotError::io(format!("archive {}", archive.display()), e))?;
    let mut zip = zip::ZipArchive::new(io::BufReader::new(file))
        .map_err(|e| DepotError::zip(archive, e))?;

    fs::create_dir_all(dest)
        .map_err(|e| DepotError::io(format!("create {}", dest.display()), e))?;

    let mut written = 0;
    for i in 0..zip.len() {
        if cancel.is_cancelled() {
            return Err(DepotError::Cancelled);
        }
        let mut entry = zip.by_index(i).map_err(|e| DepotError::zip(archive, e))?;
        let name = normalize_entry_name(entry.name());

        let Some(rel) = entry_relative_path(&name) else {
            if !is_placeholder(&name) {
                tracing::warn!(entry = %name, "skipping archive entry with unsafe path");
            }
            continue;
        };
        let outpath = dest.join(rel);

        if entry.is_dir() || is_placeholder(&name) {
            fs::create_dir_all(&outpath)
                .map_err(|e| DepotError::io(format!("create {}", outpath.display()), e))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DepotError::io(format!("create {}", parent.display()), e))?;
        }
        let mut out = File::create(&outpath)
            .map_err(|e| DepotError::io(format!("create {}", outpath.display()), e))?;
        io::copy(&mut entry, &mut out).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => DepotError::Archive {
                path: archive.to_path_buf(),
                message: format!("entry {name}: {e}"),
            },
            _ => DepotError::io(format!("extract {}", outpath.display()), e),
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode)).ok();
            }
        }
        written += 1;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, body) in entries {
                if name.ends_with('/') {
                    zip.add_directory(*name, options).unwrap();
                } else {
                    zip.start_file(*name, options).unwrap();
                    zip.write_all(body.as_bytes()).unwrap();
                }
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn extracts_nested_entries() {
        let temp = tempfile::TempDir::new().unwrap();
        let archive = temp.path().join("a.zip");
        fs::write(&archive, zip_with(&[("x.txt", "1"), ("sub/", ""), ("sub/y.txt", "2")])).unwrap();

        let dest = temp.path().join("dest");
        let n = unpack_archive(&archive, &dest, &CancellationToken::new()).unwrap();

        assert_eq!(n, 2);
        assert_eq!(fs::read_to_string(dest.join("x.txt")).unwrap(), "1");
        assert_eq!(fs::read_to_string(dest.join("sub").join("y.txt")).unwrap(), "2");
    }

    #[test]
    fn overwrites_leftovers() {
        let temp = tempfile::TempDir::new().unwrap();
        let archive = temp.path().join("a.zip");
        fs::write(&archive, zip_with(&[("x.txt", "new")])).unwrap();
        let dest = temp.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("x.txt"), "old and longer").unwrap();

        unpack_archive(&archive, &dest, &CancellationToken::new()).unwrap();
        assert_eq!(fs::read_to_string(dest.join("x.txt")).unwrap(), "new");
    }

    #[test]
    fn skips_traversal_entries() {
        let temp = tempfile::TempDir::new().unwrap();
        let archive = temp.path().join("a.zip");
        fs::write(&archive, zip_with(&[("../evil.txt", "x"), ("ok.txt", "y")])).unwrap();
        let dest = temp.path().join("dest");

        let n = unpack_archive(&archive, &dest, &CancellationToken::new()).unwrap();
        assert_eq!(n, 1);
        assert!(!temp.path().join("evil.txt").exists());
    }

    #[test]
    fn corrupt_archive_is_archive_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let archive = temp.path().join("bad.zip");
        fs::write(&archive, "definitely not a zip archive\n".repeat(64)).unwrap();
        let err = unpack_archive(&archive, &temp.path().join("d"), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, DepotError::Archive { .. }));
    }

    #[test]
    fn missing_archive_is_not_found() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = unpack_archive(
            &temp.path().join("none.zip"),
            &temp.path().join("d"),
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn cancelled_token_stops_extraction() {
        let temp = tempfile::TempDir::new().unwrap();
        let archive = temp.path().join("a.zip");
        fs::write(&archive, zip_with(&[("x.txt", "1")])).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = unpack_archive(&archive, &temp.path().join("d"), &token).unwrap_err();
        assert!(matches!(err, DepotError::Cancelled));
    }
}
