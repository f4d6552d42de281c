//! Backup, stop, replace, start.
//!
//! The [`Deployer`] runs a linear sequence against one target directory:
//!
//! ```text
//! Lock -> Resolve -> Backup -> StopService -> Replace -> StartService -> Done
//! ```
//!
//! The backup is written before anything destructive happens, so a failed
//! backup aborts with the target untouched. Once the service has been asked to
//! stop, a start is always attempted, even when Replace failed and left the
//! target inconsistent; the snapshot is then the recovery path.

pub mod lock;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::backup::BackupStore;
use crate::error::{CleanupWarning, DepotError};
use crate::fs::{digest_tree, is_within};
use crate::replace::replace_directory_contents;
use crate::resolve::{ArtifactResolver, Provenance, ResolvePolicy};
use crate::service::{ServiceAction, ServiceControl, ServiceOutcome};

pub use lock::DeployLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStep {
    Lock,
    Resolve,
    Backup,
    StopService,
    Replace,
    StartService,
    Done,
}

impl DeployStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Resolve => "resolve",
            Self::Backup => "backup",
            Self::StopService => "stop-service",
            Self::Replace => "replace",
            Self::StartService => "start-service",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths and names the deployer operates on.
#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// Live directory the service serves from.
    pub target_dir: PathBuf,
    /// Where backup snapshots are written.
    pub backup_dir: PathBuf,
    /// Name passed to the service-control capability.
    pub service_name: String,
}

impl DeploySettings {
    fn lock_dir(&self) -> PathBuf {
        self.backup_dir.join("locks")
    }

    /// Replace clears the target, so snapshots and lock files must live
    /// outside it.
    pub fn validate(&self) -> Result<(), DepotError> {
        if is_within(&self.backup_dir, &self.target_dir) {
            return Err(DepotError::validation(
                "backup_dir",
                format!(
                    "{} is inside the deployment target {}",
                    self.backup_dir.display(),
                    self.target_dir.display()
                ),
            ));
        }
        Ok(())
    }
}

/// What a deployment (or a failed attempt) did.
#[derive(Debug, Default)]
pub struct DeployReport {
    pub artifact: Option<PathBuf>,
    pub provenance: Option<Provenance>,
    /// Snapshot of the pre-deployment target; `None` when there was nothing
    /// to back up.
    pub snapshot: Option<PathBuf>,
    pub backup_skipped: bool,
    pub stop: Option<ServiceOutcome>,
    pub start: Option<ServiceOutcome>,
    pub files_written: usize,
    /// Non-fatal cleanup problems.
    pub warnings: Vec<CleanupWarning>,
    /// Digest of the target after a successful replace.
    pub digest: Option<String>,
    pub completed: Vec<DeployStep>,
}

/// A fatal error together with the step it hit and what had been done.
#[derive(Debug, Error)]
#[error("deployment failed during {step}: {error}")]
pub struct DeployFailure {
    pub step: DeployStep,
    #[source]
    pub error: DepotError,
    pub report: Box<DeployReport>,
}

pub struct Deployer {
    settings: DeploySettings,
    resolver: ArtifactResolver,
    service: Box<dyn ServiceControl>,
}

impl fmt::Debug for Deployer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployer")
            .field("settings", &self.settings)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl Deployer {
    pub fn new(
        settings: DeploySettings,
        resolver: ArtifactResolver,
        service: Box<dyn ServiceControl>,
    ) -> Self {
        Self {
            settings,
            resolver,
            service,
        }
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    pub fn backups(&self) -> BackupStore {
        BackupStore::new(&self.settings.backup_dir)
    }

    /// Resolve an artifact and deploy it to the target.
    pub fn run(
        &self,
        policy: ResolvePolicy,
        cancel: &CancellationToken,
    ) -> Result<DeployReport, DeployFailure> {
        let mut report = DeployReport::default();
        let _lock = self.lock(&mut report)?;

        log_step(DeployStep::Resolve, "resolve package archive");
        let reference = match self.resolver.resolve(policy, cancel) {
            Ok(reference) => reference,
            Err(e) => return Err(fail(DeployStep::Resolve, e, report)),
        };
        tracing::info!(
            step = %DeployStep::Resolve,
            path = %reference.path().display(),
            source = %reference.provenance(),
            "package resolved"
        );
        report.artifact = Some(reference.path().to_path_buf());
        report.provenance = Some(reference.provenance().clone());
        report.completed.push(DeployStep::Resolve);

        // `reference` outlives `apply`, so a downloaded archive is deleted
        // only after the swap has consumed it.
        self.apply(reference.path(), report, cancel)
    }

    /// Put a backup snapshot back in place of the current target.
    ///
    /// Uses the latest snapshot when `snapshot` is `None`. The current target
    /// is itself backed up first.
    pub fn restore(
        &self,
        snapshot: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<DeployReport, DeployFailure> {
        let mut report = DeployReport::default();
        let _lock = self.lock(&mut report)?;

        log_step(DeployStep::Resolve, "select backup snapshot");
        let chosen = match snapshot {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(path) => {
                let err = DepotError::not_found(format!("snapshot {}", path.display()));
                return Err(fail(DeployStep::Resolve, err, report));
            }
            None => match self.backups().latest() {
                Ok(Some(path)) => path,
                Ok(None) => {
                    let err = DepotError::not_found(format!(
                        "no snapshots in {}",
                        self.settings.backup_dir.display()
                    ));
                    return Err(fail(DeployStep::Resolve, err, report));
                }
                Err(e) => return Err(fail(DeployStep::Resolve, e, report)),
            },
        };
        tracing::info!(step = %DeployStep::Resolve, path = %chosen.display(), "restoring snapshot");
        report.artifact = Some(chosen.clone());
        report.completed.push(DeployStep::Resolve);

        self.apply(&chosen, report, cancel)
    }

    fn lock(&self, report: &mut DeployReport) -> Result<DeployLock, DeployFailure> {
        if let Err(e) = self.settings.validate() {
            return Err(fail(DeployStep::Lock, e, std::mem::take(report)));
        }
        match DeployLock::acquire(&self.settings.lock_dir(), &self.settings.target_dir) {
            Ok(lock) => {
                report.completed.push(DeployStep::Lock);
                Ok(lock)
            }
            Err(e) => Err(fail(DeployStep::Lock, e, std::mem::take(report))),
        }
    }

    fn apply(
        &self,
        archive: &Path,
        mut report: DeployReport,
        cancel: &CancellationToken,
    ) -> Result<DeployReport, DeployFailure> {
        let target = &self.settings.target_dir;

        // Backup
        log_step(DeployStep::Backup, "back up current target");
        if !target.exists() {
            if let Err(e) = std::fs::create_dir_all(target) {
                let err = DepotError::io(format!("create {}", target.display()), e);
                return Err(fail(DeployStep::Backup, err, report));
            }
            tracing::warn!(
                step = %DeployStep::Backup,
                target = %target.display(),
                "target did not exist; created it and skipped backup"
            );
            report.backup_skipped = true;
        } else {
            match self.backups().snapshot(target) {
                Ok(path) => {
                    tracing::info!(step = %DeployStep::Backup, path = %path.display(), "backup saved");
                    report.snapshot = Some(path);
                }
                Err(e) => return Err(fail(DeployStep::Backup, e, report)),
            }
        }
        report.completed.push(DeployStep::Backup);

        if cancel.is_cancelled() {
            return Err(fail(DeployStep::StopService, DepotError::Cancelled, report));
        }

        // StopService
        log_step(DeployStep::StopService, "stop service");
        report.stop = Some(self.control(ServiceAction::Stop));
        report.completed.push(DeployStep::StopService);

        // Replace
        log_step(DeployStep::Replace, "replace target contents");
        let replaced = if cancel.is_cancelled() {
            tracing::warn!(step = %DeployStep::Replace, "cancelled after stopping the service; target left unchanged");
            Err(DepotError::Cancelled)
        } else {
            replace_directory_contents(target, archive, cancel)
        };
        let replace_error = match replaced {
            Ok(result) => {
                for warning in &result.warnings {
                    tracing::warn!(step = %DeployStep::Replace, path = %warning.path.display(), error = %warning.message, "left behind during clear");
                }
                report.warnings.extend(result.warnings);
                report.files_written = result.files_written;
                report.completed.push(DeployStep::Replace);
                tracing::info!(step = %DeployStep::Replace, files = report.files_written, "files extracted");
                None
            }
            Err(e) => {
                tracing::error!(
                    step = %DeployStep::Replace,
                    error = %e,
                    "extraction failed; target may be inconsistent, restore from the latest backup"
                );
                Some(e)
            }
        };

        // StartService runs even after a failed replace to limit downtime.
        log_step(DeployStep::StartService, "start service");
        report.start = Some(self.control(ServiceAction::Start));
        report.completed.push(DeployStep::StartService);

        if let Some(e) = replace_error {
            return Err(fail(DeployStep::Replace, e, report));
        }

        match digest_tree(target) {
            Ok(digest) => report.digest = Some(digest),
            Err(e) => tracing::warn!(error = %e, "could not digest deployed target"),
        }

        report.completed.push(DeployStep::Done);
        tracing::info!(step = %DeployStep::Done, "deployment complete");
        Ok(report)
    }

    /// Best effort; never fails the deployment.
    fn control(&self, action: ServiceAction) -> ServiceOutcome {
        let name = &self.settings.service_name;
        let step = match action {
            ServiceAction::Stop => DeployStep::StopService,
            ServiceAction::Start => DeployStep::StartService,
        };
        match self.service.control(action, name) {
            Ok(ServiceOutcome::Unavailable(reason)) => {
                tracing::warn!(step = %step, service = %name, %reason, "service control unavailable; continuing");
                ServiceOutcome::Unavailable(reason)
            }
            Ok(outcome @ ServiceOutcome::Completed { .. }) => {
                if let ServiceOutcome::Completed { code, stdout, stderr } = &outcome {
                    if !stdout.is_empty() {
                        tracing::info!(step = %step, output = %stdout, "service control output");
                    }
                    if !stderr.is_empty() {
                        tracing::error!(step = %step, output = %stderr, "service control error output");
                    }
                    if *code != Some(0) {
                        tracing::warn!(step = %step, service = %name, code = ?code, "service control exited unsuccessfully");
                    }
                }
                outcome
            }
            Err(e) => {
                tracing::warn!(step = %step, service = %name, error = %e, "service control failed; continuing");
                ServiceOutcome::Unavailable(e.to_string())
            }
        }
    }
}

fn log_step(step: DeployStep, message: &str) {
    tracing::info!(step = %step, "{message}");
}

fn fail(step: DeployStep, error: DepotError, report: DeployReport) -> DeployFailure {
    tracing::error!(step = %step, kind = error.kind(), error = %error, "deployment aborted");
    DeployFailure {
        step,
        error,
        report: Box::new(report),
    }
}
