//! Configuration schema for depot.toml

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DepotError, Result};
use crate::resolve::{RemoteSource, ResolvePolicy};
use crate::types::{Tag, TerminalId, validate_identifier};

/// Root configuration structure for depot.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepotConfig {
    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub artifact_api: ArtifactApiConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Where and how a package is deployed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploymentConfig {
    /// Live directory served by the web service
    pub target_dir: PathBuf,

    /// Service (site) name handed to the service-control command
    pub service_name: String,

    /// Explicit local archive, tried after the remote API
    pub local_archive: Option<PathBuf>,

    /// Conventional archive location, tried last
    pub default_archive: PathBuf,

    /// Snapshot directory
    pub backup_dir: PathBuf,

    /// External service-control executable
    pub service_command: Option<PathBuf>,

    /// Arguments for `service_command`; `{action}` and `{name}` are substituted
    pub service_args: Vec<String>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            target_dir: default_target_dir(),
            service_name: "Default Web Site".to_string(),
            local_archive: None,
            default_archive: PathBuf::from("artifacts/packages/site.zip"),
            backup_dir: PathBuf::from("artifacts/backups"),
            service_command: None,
            service_args: vec!["{action}".to_string(), "{name}".to_string()],
        }
    }
}

fn default_target_dir() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\inetpub\wwwroot")
    } else {
        PathBuf::from("/var/www/html")
    }
}

/// Remote artifact API coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactApiConfig {
    pub base_url: Option<String>,
    pub terminal_id: Option<String>,
    pub tag: Option<String>,

    /// Whole-transfer timeout
    pub timeout_secs: u64,

    /// Remote failure aborts instead of falling back to local archives
    pub required: bool,
}

impl Default for ArtifactApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            terminal_id: None,
            tag: None,
            timeout_secs: 300,
            required: false,
        }
    }
}

impl ArtifactApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Artifact server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,

    /// Root of the artifact store; master archives live at `{store_root}/{tag}.zip`
    pub store_root: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            store_root: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| DepotError::Config(format!("invalid server.bind '{}': {e}", self.bind)))
    }
}

impl DepotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate values serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        let api = &self.artifact_api;
        if let Some(raw) = &api.base_url {
            parse_base_url(raw)?;
        }
        if let Some(id) = &api.terminal_id {
            validate_identifier("artifact_api.terminal_id", id)?;
        }
        if let Some(tag) = &api.tag {
            validate_identifier("artifact_api.tag", tag)?;
        }
        if api.timeout_secs == 0 {
            return Err(DepotError::Config(
                "artifact_api.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.deployment.service_name.trim().is_empty() {
            return Err(DepotError::Config(
                "deployment.service_name must not be empty".to_string(),
            ));
        }
        self.server.bind_addr()?;
        Ok(())
    }

    /// Remote source, present only when base URL, terminal id and tag are all set.
    pub fn remote_source(&self) -> Result<Option<RemoteSource>> {
        let api = &self.artifact_api;
        let (Some(base_url), Some(terminal_id), Some(tag)) =
            (&api.base_url, &api.terminal_id, &api.tag)
        else {
            return Ok(None);
        };
        Ok(Some(RemoteSource {
            base_url: parse_base_url(base_url)?,
            terminal_id: TerminalId::new(terminal_id.as_str())?,
            tag: Tag::new(tag.as_str())?,
        }))
    }

    /// Resolution policy implied by the config; CLI flags refine it.
    pub fn resolve_policy(&self) -> ResolvePolicy {
        ResolvePolicy {
            require_remote: self.artifact_api.required,
            ..ResolvePolicy::default()
        }
    }

    /// Apply `DEPOT_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DEPOT_TARGET_DIR") {
            self.deployment.target_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DEPOT_SERVICE_NAME") {
            self.deployment.service_name = v;
        }
        if let Some(v) = get("DEPOT_LOCAL_ARCHIVE") {
            self.deployment.local_archive = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DEPOT_BACKUP_DIR") {
            self.deployment.backup_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DEPOT_API_BASE_URL") {
            self.artifact_api.base_url = Some(v);
        }
        if let Some(v) = get("DEPOT_API_TERMINAL_ID") {
            self.artifact_api.terminal_id = Some(v);
        }
        if let Some(v) = get("DEPOT_API_TAG") {
            self.artifact_api.tag = Some(v);
        }
        if let Some(v) = get("DEPOT_STORE_ROOT") {
            self.server.store_root = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DEPOT_BIND") {
            self.server.bind = v;
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| DepotError::Config(format!("invalid artifact_api.base_url '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DepotError::Config(format!(
            "artifact_api.base_url must use http or https, got '{other}'"
        ))),
    }
}
