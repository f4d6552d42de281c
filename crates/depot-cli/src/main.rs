//! Depot - web package deployer
//!
//! Usage:
//!   depot deploy                      # Resolve a package and deploy it
//!   depot extract <master> <id> <out> # Carve one terminal's package
//!   depot backups                     # List backup snapshots
//!   depot restore                     # Roll back to the latest snapshot

mod interactive;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use depot_core::archive::extract_subset;
use depot_core::backup::BackupStore;
use depot_core::config::{ConfigStore, DepotConfig, DeploymentConfig};
use depot_core::deploy::{DeployFailure, DeployReport, DeploySettings, Deployer};
use depot_core::fetch::HttpArtifactFetcher;
use depot_core::resolve::ArtifactResolver;
use depot_core::service::{CommandServiceControl, NoopServiceControl, ServiceControl};
use depot_core::types::TerminalId;

use crate::interactive::{Summary, TerminalPrompt};

const APPCMD_PATH: &str = r"C:\Windows\System32\inetsrv\appcmd.exe";

#[derive(Parser)]
#[command(name = "depot")]
#[command(about = "Web package deployer", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up the target, stop the service, replace the site, start it again
    Deploy(DeployArgs),

    /// Write the entries under `<terminal_id>/` of a master archive to a new archive
    Extract {
        /// Master archive with one top-level folder per terminal
        master: PathBuf,
        /// Terminal whose folder becomes the archive root
        terminal_id: String,
        /// Output archive
        out: PathBuf,
    },

    /// List backup snapshots, oldest first
    Backups,

    /// Restore a backup snapshot into the target
    Restore {
        /// Snapshot to restore (defaults to the latest)
        #[arg(long, value_name = "FILE")]
        snapshot: Option<PathBuf>,

        /// Deployment target directory
        #[arg(long, value_name = "DIR")]
        target: Option<PathBuf>,
    },
}

#[derive(Args)]
struct DeployArgs {
    /// Deployment target directory
    #[arg(long, value_name = "DIR")]
    target: Option<PathBuf>,

    /// Local package archive to use when the artifact API is unavailable
    #[arg(long, value_name = "ZIP")]
    archive: Option<PathBuf>,

    /// Fail instead of falling back when the artifact API download fails
    #[arg(long)]
    require_remote: bool,

    /// Never use the configured or default local archive
    #[arg(long)]
    no_local_fallback: bool,

    /// Do not prompt for an archive path
    #[arg(long)]
    non_interactive: bool,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "depot=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Deploy(args) => run_deploy(config, args),
        Commands::Extract {
            master,
            terminal_id,
            out,
        } => run_extract(&master, &terminal_id, &out),
        Commands::Backups => run_backups(&config),
        Commands::Restore { snapshot, target } => run_restore(config, snapshot, target),
    }
}

fn load_config(path: Option<&Path>) -> Result<DepotConfig> {
    let store = match path {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default_location()?,
    };
    let config = store
        .load_with_env()
        .with_context(|| format!("Failed to load config: {}", store.config_path().display()))?;
    tracing::debug!(path = %store.config_path().display(), "configuration loaded");
    Ok(config)
}

fn run_deploy(mut config: DepotConfig, args: DeployArgs) -> Result<()> {
    if let Some(target) = args.target {
        config.deployment.target_dir = target;
    }
    if let Some(archive) = args.archive {
        config.deployment.local_archive = Some(archive);
    }

    let mut policy = config.resolve_policy();
    policy.require_remote |= args.require_remote;
    policy.allow_local_fallback = !args.no_local_fallback;
    policy.interactive = !args.non_interactive && TerminalPrompt::available();

    let fetcher = HttpArtifactFetcher::new(config.artifact_api.timeout())?;
    let mut resolver = ArtifactResolver::new(Box::new(fetcher))
        .with_remote(config.remote_source()?)
        .with_local_archive(config.deployment.local_archive.clone())
        .with_default_archive(Some(config.deployment.default_archive.clone()));
    if policy.interactive {
        resolver = resolver.with_prompt(Box::new(TerminalPrompt::new()));
    }

    let deployer = Deployer::new(
        settings(&config.deployment),
        resolver,
        service_control(&config.deployment),
    );

    let mut summary = Summary::stdout();
    summary.banner("Depot Deploy", &config.deployment.target_dir)?;

    let cancel = interrupt_token();
    let outcome = deployer.run(policy, &cancel);
    finish(&mut summary, outcome)
}

fn run_restore(
    mut config: DepotConfig,
    snapshot: Option<PathBuf>,
    target: Option<PathBuf>,
) -> Result<()> {
    if let Some(target) = target {
        config.deployment.target_dir = target;
    }

    // Restores never download, so the fetcher is never called.
    let fetcher = HttpArtifactFetcher::new(config.artifact_api.timeout())?;
    let deployer = Deployer::new(
        settings(&config.deployment),
        ArtifactResolver::new(Box::new(fetcher)),
        service_control(&config.deployment),
    );

    let mut summary = Summary::stdout();
    summary.banner("Depot Restore", &config.deployment.target_dir)?;

    let cancel = interrupt_token();
    let outcome = deployer.restore(snapshot.as_deref(), &cancel);
    finish(&mut summary, outcome)
}

fn finish(
    summary: &mut Summary,
    outcome: std::result::Result<DeployReport, DeployFailure>,
) -> Result<()> {
    match outcome {
        Ok(report) => {
            summary.success(&report)?;
            Ok(())
        }
        Err(failure) => {
            summary.failure(&failure)?;
            Err(failure.into())
        }
    }
}

fn run_extract(master: &Path, terminal_id: &str, out: &Path) -> Result<()> {
    let terminal = TerminalId::new(terminal_id)?;
    let summary = extract_subset(master, terminal.as_str(), out, &interrupt_token())
        .with_context(|| format!("Failed to extract '{terminal}' from {}", master.display()))?;
    println!(
        "✓ Wrote {} ({} entries for '{terminal}')",
        out.display(),
        summary.written
    );
    Ok(())
}

fn run_backups(config: &DepotConfig) -> Result<()> {
    let store = BackupStore::new(&config.deployment.backup_dir);
    let snapshots = store.list()?;
    if snapshots.is_empty() {
        println!("No backups in {}", store.dir().display());
        return Ok(());
    }

    println!("Backups in {} (oldest first):", store.dir().display());
    for path in snapshots {
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        println!("  {name:<40} {size:>12} bytes");
    }
    Ok(())
}

fn settings(deployment: &DeploymentConfig) -> DeploySettings {
    DeploySettings {
        target_dir: deployment.target_dir.clone(),
        backup_dir: deployment.backup_dir.clone(),
        service_name: deployment.service_name.clone(),
    }
}

/// An explicitly configured command wins; otherwise IIS on Windows, no-op elsewhere.
fn service_control(deployment: &DeploymentConfig) -> Box<dyn ServiceControl> {
    if let Some(program) = &deployment.service_command {
        return Box::new(CommandServiceControl::new(
            program,
            deployment.service_args.clone(),
        ));
    }
    if cfg!(windows) {
        let appcmd = Path::new(APPCMD_PATH);
        if appcmd.is_file() {
            return Box::new(CommandServiceControl::appcmd(appcmd));
        }
        return Box::new(NoopServiceControl::with_reason(format!(
            "{APPCMD_PATH} not found"
        )));
    }
    Box::new(NoopServiceControl::with_reason(
        "no service_command configured",
    ))
}

/// Token cancelled on the first Ctrl-C; a second Ctrl-C exits immediately.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    std::thread::spawn(move || {
        let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        else {
            return;
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; cancelling");
                trigger.cancel();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });
    });
    token
}
