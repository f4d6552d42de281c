mod support;

use std::path::{Path, PathBuf};

use depot_core::deploy::{DeployLock, DeploySettings, DeployStep, Deployer};
use depot_core::error::DepotError;
use depot_core::fs::digest_tree;
use depot_core::fetch::ArtifactFetcher;
use depot_core::resolve::{ArtifactResolver, Provenance, RemoteSource, ResolvePolicy};
use depot_core::service::{NoopServiceControl, ServiceAction};
use depot_core::types::{Tag, TerminalId};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;

use support::{CancelOnStop, OfflineFetcher, RecordingService, ServingFetcher, write_zip, zip_bytes};

struct Fixture {
    temp: TempDir,
    service: RecordingService,
}

impl Fixture {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            service: RecordingService::default(),
        }
    }

    fn target(&self) -> PathBuf {
        self.temp.path().join("wwwroot")
    }

    fn backups(&self) -> PathBuf {
        self.temp.path().join("backups")
    }

    fn package(&self, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.temp.path().join("packages/site.zip");
        write_zip(&path, entries);
        path
    }

    fn downloads(&self) -> PathBuf {
        self.temp.path().join("downloads")
    }

    fn settings(&self) -> DeploySettings {
        DeploySettings {
            target_dir: self.target(),
            backup_dir: self.backups(),
            service_name: "Default Web Site".to_string(),
        }
    }

    fn deployer(&self, archive: &Path) -> Deployer {
        let resolver =
            ArtifactResolver::new(Box::new(OfflineFetcher)).with_local_archive(Some(archive.into()));
        Deployer::new(self.settings(), resolver, Box::new(self.service.clone()))
    }

    /// Deployer whose package comes from the artifact API.
    fn remote_deployer(&self, fetcher: impl ArtifactFetcher + 'static) -> Deployer {
        let resolver = ArtifactResolver::new(Box::new(fetcher))
            .with_remote(Some(RemoteSource {
                base_url: Url::parse("http://artifacts.test/").unwrap(),
                terminal_id: TerminalId::new("T1").unwrap(),
                tag: Tag::new("v1").unwrap(),
            }))
            .with_temp_dir(self.downloads());
        Deployer::new(self.settings(), resolver, Box::new(self.service.clone()))
    }

    fn live_site(&self) {
        std::fs::create_dir_all(self.target()).unwrap();
        std::fs::write(self.target().join("index.html"), b"live").unwrap();
    }

    fn index(&self) -> Vec<u8> {
        std::fs::read(self.target().join("index.html")).unwrap()
    }

    fn downloads_are_empty(&self) -> bool {
        std::fs::read_dir(self.downloads()).unwrap().next().is_none()
    }
}

#[test]
fn deploy_replaces_target_and_cycles_service() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.target().join("old")).unwrap();
    std::fs::write(fx.target().join("old/stale.html"), b"stale").unwrap();
    let archive = fx.package(&[("index.html", b"new"), ("css/site.css", b"body{}")]);

    let report = fx
        .deployer(&archive)
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap();

    assert_eq!(report.provenance, Some(Provenance::Configured));
    assert_eq!(report.files_written, 2);
    assert!(report.snapshot.as_ref().is_some_and(|p| p.is_file()));
    assert!(!fx.target().join("old").exists());
    assert_eq!(std::fs::read(fx.target().join("index.html")).unwrap(), b"new");
    assert_eq!(fx.service.actions(), vec![ServiceAction::Stop, ServiceAction::Start]);
    assert_eq!(
        fx.service.calls.lock().unwrap()[0].1,
        "Default Web Site".to_string()
    );
    assert_eq!(
        report.completed,
        vec![
            DeployStep::Lock,
            DeployStep::Resolve,
            DeployStep::Backup,
            DeployStep::StopService,
            DeployStep::Replace,
            DeployStep::StartService,
            DeployStep::Done,
        ]
    );
    assert_eq!(report.digest, Some(digest_tree(&fx.target()).unwrap()));
}

#[test]
fn redeploying_same_archive_is_idempotent() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.target()).unwrap();
    let archive = fx.package(&[("index.html", b"v1"), ("img/", b""), ("img/logo.png", b"png")]);
    let deployer = fx.deployer(&archive);

    let first = deployer
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap();
    let second = deployer
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap();

    assert_eq!(first.digest, second.digest);
    assert_ne!(first.snapshot, second.snapshot);
    assert_eq!(deployer.backups().list().unwrap().len(), 2);
}

#[test]
fn missing_target_is_created_without_backup() {
    let fx = Fixture::new();
    let archive = fx.package(&[("index.html", b"fresh")]);

    let report = fx
        .deployer(&archive)
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap();

    assert!(report.backup_skipped);
    assert!(report.snapshot.is_none());
    assert!(fx.target().join("index.html").is_file());
    assert!(fx.deployer(&archive).backups().list().unwrap().is_empty());
}

#[test]
fn corrupt_archive_still_restarts_service() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.target()).unwrap();
    std::fs::write(fx.target().join("index.html"), b"live").unwrap();
    let archive = fx.temp.path().join("packages/site.zip");
    std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
    std::fs::write(&archive, "not a zip file at all\n".repeat(64)).unwrap();

    let failure = fx
        .deployer(&archive)
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap_err();

    assert_eq!(failure.step, DeployStep::Replace);
    assert!(matches!(failure.error, DepotError::Archive { .. }));
    assert_eq!(fx.service.actions(), vec![ServiceAction::Stop, ServiceAction::Start]);
    assert!(failure.report.completed.contains(&DeployStep::StartService));

    // The pre-deployment state is recoverable from the snapshot.
    let snapshot = failure.report.snapshot.clone().unwrap();
    let names = support::zip_names(&snapshot);
    assert_eq!(names, vec!["index.html"]);
}

#[test]
fn unresolvable_artifact_leaves_target_untouched() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.target()).unwrap();
    std::fs::write(fx.target().join("index.html"), b"live").unwrap();

    let failure = fx
        .deployer(&fx.temp.path().join("missing.zip"))
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap_err();

    assert_eq!(failure.step, DeployStep::Resolve);
    assert!(matches!(failure.error, DepotError::Resolution(_)));
    assert!(fx.service.actions().is_empty());
    assert_eq!(std::fs::read(fx.target().join("index.html")).unwrap(), b"live");
}

#[test]
fn concurrent_deployment_is_rejected() {
    let fx = Fixture::new();
    let archive = fx.package(&[("index.html", b"new")]);
    let _held = DeployLock::acquire(&fx.backups().join("locks"), &fx.target()).unwrap();

    let failure = fx
        .deployer(&archive)
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap_err();

    assert_eq!(failure.step, DeployStep::Lock);
    assert!(matches!(failure.error, DepotError::DeploymentInProgress(_)));
    assert!(!fx.target().exists());
}

#[test]
fn cancelled_before_stop_leaves_service_alone() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.target()).unwrap();
    let archive = fx.package(&[("index.html", b"new")]);
    let token = CancellationToken::new();
    token.cancel();

    let failure = fx
        .deployer(&archive)
        .run(ResolvePolicy::default(), &token)
        .unwrap_err();

    assert!(matches!(failure.error, DepotError::Cancelled));
    assert!(fx.service.actions().is_empty());
}

#[test]
fn unavailable_service_control_does_not_fail_deployment() {
    let fx = Fixture::new();
    let archive = fx.package(&[("index.html", b"new")]);
    let deployer = Deployer::new(
        DeploySettings {
            target_dir: fx.target(),
            backup_dir: fx.backups(),
            service_name: "site".to_string(),
        },
        ArtifactResolver::new(Box::new(OfflineFetcher)).with_local_archive(Some(archive)),
        Box::new(NoopServiceControl::new()),
    );

    let report = deployer
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap();

    assert!(report.stop.is_some_and(|o| !o.succeeded()));
    assert!(report.completed.contains(&DeployStep::Done));
}

#[test]
fn restore_puts_latest_snapshot_back() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.target()).unwrap();
    std::fs::write(fx.target().join("index.html"), b"v1").unwrap();
    let archive = fx.package(&[("index.html", b"v2")]);
    let deployer = fx.deployer(&archive);

    deployer
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap();
    assert_eq!(std::fs::read(fx.target().join("index.html")).unwrap(), b"v2");

    let report = deployer.restore(None, &CancellationToken::new()).unwrap();

    assert_eq!(std::fs::read(fx.target().join("index.html")).unwrap(), b"v1");
    assert!(report.snapshot.is_some(), "restore backs up the current target first");
    assert_eq!(deployer.backups().list().unwrap().len(), 2);
}

#[test]
fn restore_without_snapshots_is_not_found() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.target()).unwrap();
    let deployer = fx.deployer(&fx.temp.path().join("unused.zip"));

    let failure = deployer.restore(None, &CancellationToken::new()).unwrap_err();
    assert_eq!(failure.step, DeployStep::Resolve);
    assert!(failure.error.is_not_found());
}

#[cfg(unix)]
#[test]
fn failed_backup_aborts_before_service_and_target() {
    let fx = Fixture::new();
    fx.live_site();
    // A dangling link cannot be archived, so the snapshot fails.
    std::os::unix::fs::symlink(fx.temp.path().join("gone"), fx.target().join("dangling")).unwrap();
    let archive = fx.package(&[("index.html", b"new")]);

    let failure = fx
        .deployer(&archive)
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap_err();

    assert_eq!(failure.step, DeployStep::Backup);
    assert!(failure.report.snapshot.is_none());
    assert!(fx.service.actions().is_empty());
    assert_eq!(fx.index(), b"live");
    assert!(fx.target().join("dangling").symlink_metadata().is_ok());
    assert!(fx.deployer(&archive).backups().list().unwrap().is_empty());
}

#[test]
fn cancel_during_stop_keeps_target_and_restarts_service() {
    let fx = Fixture::new();
    fx.live_site();
    let archive = fx.package(&[("index.html", b"new")]);
    let token = CancellationToken::new();
    let deployer = Deployer::new(
        fx.settings(),
        ArtifactResolver::new(Box::new(OfflineFetcher)).with_local_archive(Some(archive)),
        Box::new(CancelOnStop {
            inner: fx.service.clone(),
            token: token.clone(),
        }),
    );

    let failure = deployer.run(ResolvePolicy::default(), &token).unwrap_err();

    assert_eq!(failure.step, DeployStep::Replace);
    assert!(matches!(failure.error, DepotError::Cancelled));
    assert!(!failure.report.completed.contains(&DeployStep::Replace));
    assert_eq!(fx.service.actions(), vec![ServiceAction::Stop, ServiceAction::Start]);
    assert_eq!(fx.index(), b"live");
}

#[test]
fn backup_dir_inside_target_is_rejected() {
    let fx = Fixture::new();
    fx.live_site();
    let archive = fx.package(&[("index.html", b"new")]);
    let spellings = [
        fx.target().join("backups"),
        fx.temp.path().join("elsewhere/../wwwroot/backups"),
        fx.target(),
    ];

    for backup_dir in spellings {
        let deployer = Deployer::new(
            DeploySettings {
                backup_dir: backup_dir.clone(),
                ..fx.settings()
            },
            ArtifactResolver::new(Box::new(OfflineFetcher)).with_local_archive(Some(archive.clone())),
            Box::new(fx.service.clone()),
        );

        let failure = deployer
            .run(ResolvePolicy::default(), &CancellationToken::new())
            .unwrap_err();

        assert_eq!(failure.step, DeployStep::Lock, "{}", backup_dir.display());
        assert!(matches!(failure.error, DepotError::Validation { .. }));
    }

    assert!(!fx.target().join("backups").exists());
    assert!(fx.service.actions().is_empty());
    assert_eq!(fx.index(), b"live");
}

#[test]
fn downloaded_package_is_deleted_after_deployment() {
    let fx = Fixture::new();
    fx.live_site();
    let fetcher = ServingFetcher {
        body: zip_bytes(&[("index.html", b"remote")]),
    };

    let report = fx
        .remote_deployer(fetcher)
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap();

    assert!(matches!(report.provenance, Some(Provenance::Remote(_))));
    assert_eq!(fx.index(), b"remote");
    assert!(report.artifact.is_some_and(|p| !p.exists()));
    assert!(fx.downloads_are_empty());
}

#[test]
fn downloaded_package_is_deleted_after_failed_replace() {
    let fx = Fixture::new();
    fx.live_site();
    let fetcher = ServingFetcher {
        body: "not a zip file at all\n".repeat(64).into_bytes(),
    };

    let failure = fx
        .remote_deployer(fetcher)
        .run(ResolvePolicy::default(), &CancellationToken::new())
        .unwrap_err();

    assert_eq!(failure.step, DeployStep::Replace);
    assert!(fx.downloads_are_empty());
    assert_eq!(fx.service.actions(), vec![ServiceAction::Stop, ServiceAction::Start]);
}
