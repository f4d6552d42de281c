//! Decide where the deployable archive comes from.
//!
//! Sources are tried in a fixed order and the first success wins:
//!
//! 1. Remote artifact API, when base URL, terminal id and tag are configured
//! 2. Configured local archive path
//! 3. Conventional default archive path
//! 4. Interactive prompt
//!
//! Only a remote download produces a file the resolver owns. That file lives
//! in a [`TempArtifact`] inside the returned [`ArtifactReference`] and is
//! deleted when the reference is dropped. Local paths are never deleted.

use std::fmt;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{DepotError, Result};
use crate::fetch::ArtifactFetcher;
use crate::temp::TempArtifact;
use crate::types::{Tag, TerminalId};

/// Remote artifact endpoint for one terminal and tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSource {
    pub base_url: Url,
    pub terminal_id: TerminalId,
    pub tag: Tag,
}

impl RemoteSource {
    /// `{base_url}/artifacts/{terminal_id}/{tag}`, tolerating a trailing slash.
    pub fn artifact_url(&self) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let raw = format!("{base}/artifacts/{}/{}", self.terminal_id, self.tag);
        Url::parse(&raw).map_err(|e| DepotError::Config(format!("invalid artifact URL {raw}: {e}")))
    }
}

/// Which sources the resolver may use and how remote failure is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvePolicy {
    /// Try the configured and default local archive paths.
    pub allow_local_fallback: bool,
    /// A remote failure (or missing remote config) is fatal instead of
    /// falling through to local sources.
    pub require_remote: bool,
    /// Prompt for a path when every other source came up empty.
    pub interactive: bool,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            allow_local_fallback: true,
            require_remote: false,
            interactive: false,
        }
    }
}

/// Where a resolved archive came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Remote(Url),
    Configured,
    Default,
    UserSupplied,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "remote ({url})"),
            Self::Configured => f.write_str("configured local path"),
            Self::Default => f.write_str("default local path"),
            Self::UserSupplied => f.write_str("user-supplied path"),
        }
    }
}

/// A locally addressable archive ready to deploy.
#[derive(Debug)]
pub struct ArtifactReference {
    path: PathBuf,
    provenance: Provenance,
    owned: Option<TempArtifact>,
}

impl ArtifactReference {
    /// Reference a file the caller does not own.
    pub fn borrowed(path: impl Into<PathBuf>, provenance: Provenance) -> Self {
        Self {
            path: path.into(),
            provenance,
            owned: None,
        }
    }

    fn downloaded(artifact: TempArtifact, url: Url) -> Self {
        Self {
            path: artifact.path().to_path_buf(),
            provenance: Provenance::Remote(url),
            owned: Some(artifact),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// True when dropping this reference deletes the file.
    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }
}

/// Asks the operator for an archive path.
pub trait PathPrompt: Send + Sync {
    /// `Ok(None)` means the operator gave no answer.
    fn prompt_archive_path(&self) -> Result<Option<String>>;
}

pub struct ArtifactResolver {
    remote: Option<RemoteSource>,
    local_archive: Option<PathBuf>,
    default_archive: Option<PathBuf>,
    temp_dir: PathBuf,
    fetcher: Box<dyn ArtifactFetcher>,
    prompt: Option<Box<dyn PathPrompt>>,
}

impl fmt::Debug for ArtifactResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactResolver")
            .field("remote", &self.remote)
            .field("local_archive", &self.local_archive)
            .field("default_archive", &self.default_archive)
            .field("temp_dir", &self.temp_dir)
            .field("interactive", &self.prompt.is_some())
            .finish()
    }
}

impl ArtifactResolver {
    pub fn new(fetcher: Box<dyn ArtifactFetcher>) -> Self {
        Self {
            remote: None,
            local_archive: None,
            default_archive: None,
            temp_dir: std::env::temp_dir(),
            fetcher,
            prompt: None,
        }
    }

    pub fn with_remote(mut self, remote: Option<RemoteSource>) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_local_archive(mut self, path: Option<PathBuf>) -> Self {
        self.local_archive = path;
        self
    }

    pub fn with_default_archive(mut self, path: Option<PathBuf>) -> Self {
        self.default_archive = path;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_prompt(mut self, prompt: Box<dyn PathPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Resolve an archive according to `policy`.
    pub fn resolve(
        &self,
        policy: ResolvePolicy,
        cancel: &CancellationToken,
    ) -> Result<ArtifactReference> {
        match &self.remote {
            Some(remote) => match self.fetch_remote(remote, cancel) {
                Ok(reference) => return Ok(reference),
                Err(DepotError::Cancelled) => return Err(DepotError::Cancelled),
                Err(err) if policy.require_remote => {
                    return Err(DepotError::Resolution(format!(
                        "remote artifact required: {err}"
                    )));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "remote download failed; falling back to local resolution");
                }
            },
            None if policy.require_remote => {
                return Err(DepotError::Resolution(
                    "remote artifact required but the artifact API is not configured".to_string(),
                ));
            }
            None => {}
        }

        if policy.allow_local_fallback {
            if let Some(path) = self.local_archive.as_deref().filter(|p| p.is_file()) {
                tracing::info!(path = %path.display(), "using local archive");
                return Ok(ArtifactReference::borrowed(path, Provenance::Configured));
            }
            if let Some(path) = self.default_archive.as_deref().filter(|p| p.is_file()) {
                tracing::info!(path = %path.display(), "using default local archive");
                return Ok(ArtifactReference::borrowed(path, Provenance::Default));
            }
        }

        if policy.interactive {
            if let Some(prompt) = &self.prompt {
                return self.prompt_for_path(prompt.as_ref());
            }
        }

        Err(DepotError::Resolution(
            "no remote, configured or default archive is available".to_string(),
        ))
    }

    fn fetch_remote(
        &self,
        remote: &RemoteSource,
        cancel: &CancellationToken,
    ) -> Result<ArtifactReference> {
        let url = remote.artifact_url()?;
        tracing::info!(url = %url, "downloading package from artifact API");

        std::fs::create_dir_all(&self.temp_dir)
            .map_err(|e| DepotError::io(format!("create {}", self.temp_dir.display()), e))?;
        let artifact = TempArtifact::new_in(&self.temp_dir, "deployer", "zip");
        let bytes = self.fetcher.fetch(&url, artifact.path(), cancel)?;

        tracing::info!(path = %artifact.path().display(), bytes, "downloaded package");
        Ok(ArtifactReference::downloaded(artifact, url))
    }

    fn prompt_for_path(&self, prompt: &dyn PathPrompt) -> Result<ArtifactReference> {
        let answer = prompt.prompt_archive_path()?.unwrap_or_default();
        let trimmed = answer.trim_matches(|c| c == '"' || c == ' ');
        if trimmed.is_empty() {
            return Err(DepotError::Resolution("no archive path entered".to_string()));
        }
        let path = PathBuf::from(trimmed);
        if !path.is_file() {
            return Err(DepotError::Resolution(format!(
                "archive not found: {}",
                path.display()
            )));
        }
        Ok(ArtifactReference::borrowed(path, Provenance::UserSupplied))
    }
}
