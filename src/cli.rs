//! # Command Line Interface
//!
//! `revisiond serve [--config <path>]`: loads configuration, wires the
//! orchestrator boundary, snapshot cache, reconcile queue, secret watcher,
//! and xDS/admin servers together, and runs until ctrl-c fires.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::SnapshotCache;
use crate::config;
use crate::errors::{RevisionError, Result};
use crate::observability::{self, admin};
use crate::reconcile::queue::{drive_from_store, ReconcileQueue};
use crate::store::memory::MemoryStore;
use crate::store::{RevisionStore, SecretStore};
use crate::watcher::{run_index_builder, run_secret_watcher, SecretIndex};

#[derive(Parser)]
#[command(name = "revisiond")]
#[command(about = "Envoy xDS control-plane revision reconciler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the reconciliation engine and xDS server
    Serve {
        /// Configuration file path; falls back to REVISIOND_-prefixed env vars alone
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Parses arguments and runs the requested command to completion.
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { config } => serve(config).await,
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let app_config = match &config_path {
        Some(path) => config::load_config_from_file(path)?,
        None => config::load_config_from_env()?,
    };

    let (health, metrics_handle) = observability::init_observability(&app_config.observability)?;
    observability::log_config_info(&app_config);

    let cancel = CancellationToken::new();

    let store = Arc::new(MemoryStore::new());
    let revisions: Arc<dyn RevisionStore> = store.clone();
    let secrets: Arc<dyn SecretStore> = store.clone();

    let cache = SnapshotCache::new();
    let secret_index = Arc::new(SecretIndex::new());

    let queue = ReconcileQueue::spawn(
        app_config.reconcile.clone(),
        revisions.clone(),
        secrets.clone(),
        cache.clone(),
        cancel.clone(),
    );

    let resync_interval = Duration::from_secs(app_config.orchestrator.resync_interval_secs);
    tokio::spawn(drive_from_store(queue, revisions.clone(), resync_interval, cancel.clone()));
    tokio::spawn(run_index_builder(revisions.clone(), secret_index.clone(), cancel.clone()));
    tokio::spawn(run_secret_watcher(secrets.clone(), revisions.clone(), secret_index, cancel.clone()));

    let xds_handle = {
        let xds_config = app_config.xds.clone();
        let xds_cache = cache.clone();
        let xds_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = crate::xds::run_server(xds_config, xds_cache, xds_cancel).await {
                error!(error = %err, "xDS server exited with an error");
            }
        })
    };

    let admin_handle = match metrics_handle {
        Some(handle) => {
            let router = admin::router(health.clone(), handle);
            let addr = app_config
                .admin
                .bind_address()
                .parse::<std::net::SocketAddr>()
                .map_err(|e| RevisionError::config(format!("invalid admin bind address: {}", e)))?;
            let admin_cancel = cancel.clone();
            Some(tokio::spawn(async move {
                let listener = match tokio::net::TcpListener::bind(addr).await {
                    Ok(listener) => listener,
                    Err(err) => {
                        error!(error = %err, %addr, "failed to bind admin listener");
                        return;
                    }
                };
                info!(%addr, "starting admin server");
                if let Err(err) =
                    axum::serve(listener, router).with_graceful_shutdown(admin_cancel.cancelled_owned()).await
                {
                    error!(error = %err, "admin server exited with an error");
                }
            }))
        }
        None => None,
    };

    health.mark_ready();

    wait_for_shutdown_signal().await?;
    info!("shutdown signal received");
    health.mark_not_ready();
    cancel.cancel();

    let _ = xds_handle.await;
    if let Some(handle) = admin_handle {
        let _ = handle.await;
    }

    info!("revisiond stopped");
    Ok(())
}

/// Resolves on ctrl-c or, on unix, SIGTERM — whichever arrives first.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| RevisionError::internal(format!("failed to install SIGTERM handler: {}", e)))?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_serve_with_a_config_path() {
        let cli = Cli::parse_from(["revisiond", "serve", "--config", "revisiond.yaml"]);
        match cli.command {
            Commands::Serve { config } => assert_eq!(config, Some(PathBuf::from("revisiond.yaml"))),
        }
    }

    #[test]
    fn cli_parses_serve_without_a_config_path() {
        let cli = Cli::parse_from(["revisiond", "serve"]);
        match cli.command {
            Commands::Serve { config } => assert!(config.is_none()),
        }
    }
}
