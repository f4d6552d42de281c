#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use depot_core::error::{DepotError, Result};
use depot_core::fetch::ArtifactFetcher;
use depot_core::service::{ServiceAction, ServiceControl, ServiceOutcome};
use tokio_util::sync::CancellationToken;
use url::Url;
use zip::write::SimpleFileOptions;

/// Write a zip at `path` with the given `(name, contents)` entries.
/// Names ending in `/` become directory entries.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut writer = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    let options = SimpleFileOptions::default();
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
    }
    writer.finish().unwrap();
}

/// Sorted entry names of the zip at `path`.
pub fn zip_names(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

/// Records every control call it receives.
#[derive(Clone, Default)]
pub struct RecordingService {
    pub calls: Arc<Mutex<Vec<(ServiceAction, String)>>>,
}

impl RecordingService {
    pub fn actions(&self) -> Vec<ServiceAction> {
        self.calls.lock().unwrap().iter().map(|(a, _)| *a).collect()
    }
}

impl ServiceControl for RecordingService {
    fn control(&self, action: ServiceAction, name: &str) -> Result<ServiceOutcome> {
        self.calls.lock().unwrap().push((action, name.to_string()));
        Ok(ServiceOutcome::Completed {
            code: Some(0),
            stdout: format!("{action} ok"),
            stderr: String::new(),
        })
    }
}

/// Fetcher for deployments that never reach the network.
pub struct OfflineFetcher;

impl ArtifactFetcher for OfflineFetcher {
    fn fetch(&self, url: &Url, _dest: &Path, _cancel: &CancellationToken) -> Result<u64> {
        Err(DepotError::Resolution(format!("{url} is unreachable in tests")))
    }
}

/// Records calls like [`RecordingService`] and cancels `token` when asked to stop.
#[derive(Clone)]
pub struct CancelOnStop {
    pub inner: RecordingService,
    pub token: CancellationToken,
}

impl ServiceControl for CancelOnStop {
    fn control(&self, action: ServiceAction, name: &str) -> Result<ServiceOutcome> {
        if action == ServiceAction::Stop {
            self.token.cancel();
        }
        self.inner.control(action, name)
    }
}

/// Fetcher that writes fixed bytes to the destination.
pub struct ServingFetcher {
    pub body: Vec<u8>,
}

impl ArtifactFetcher for ServingFetcher {
    fn fetch(&self, _url: &Url, dest: &Path, _cancel: &CancellationToken) -> Result<u64> {
        std::fs::write(dest, &self.body).unwrap();
        Ok(self.body.len() as u64)
    }
}

/// Bytes of a zip with the given entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("package.zip");
    write_zip(&path, entries);
    std::fs::read(path).unwrap()
}
