//! depot-server binary: load config, bind, serve until Ctrl-C.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use depot_core::config::ConfigStore;
use depot_server::{AppState, app};

#[derive(Parser)]
#[command(name = "depot-server")]
#[command(about = "Serve per-terminal deployment packages", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address, overriding `server.bind`
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Artifact store root, overriding `server.store_root`
    #[arg(long, value_name = "DIR")]
    store_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "depot=debug,tower_http=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let store = match cli.config {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default_location()?,
    };
    let mut config = store
        .load_with_env()
        .with_context(|| format!("Failed to load config: {}", store.config_path().display()))?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(root) = cli.store_root {
        config.server.store_root = Some(root);
    }

    let addr = config.server.bind_addr()?;
    match &config.server.store_root {
        Some(root) => tracing::info!(root = %root.display(), "artifact store"),
        None => tracing::warn!("server.store_root is not set; artifact requests will fail"),
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app(AppState::from_config(&config.server)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
