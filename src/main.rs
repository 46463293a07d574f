// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Toodle-Backup scheduler process
//!
//! Polls Firestore every minute for users whose backup time has come and
//! runs their Toodledo-to-Dropbox backups.
//!
//! Usage:
//!   toodle-backup                      run the scheduler until SIGINT/SIGTERM
//!   toodle-backup run-once <username>  back up one user immediately

use anyhow::Context;
use std::sync::Arc;
use toodle_backup::{
    config::Config,
    db::{FirestoreDb, UserStore},
    services::{BackupClients, BackupOrchestrator, Scheduler},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        project = %config.gcp_project_id,
        artifact_dir = %config.artifact_dir.display(),
        external_delivery = config.delivery_command.is_some(),
        "Starting Toodle-Backup"
    );

    // Initialize Firestore database
    let store: Arc<dyn UserStore> = Arc::new(
        FirestoreDb::new(&config.gcp_project_id)
            .await
            .context("Failed to connect to Firestore")?,
    );

    let clients = BackupClients::from_config(&config).context("Failed to build API clients")?;
    let orchestrator = Arc::new(BackupOrchestrator::new(store.clone(), clients, &config));

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => run_scheduler(store, orchestrator, &config).await,
        [cmd, username] if cmd == "run-once" => run_once(store, orchestrator, username).await,
        _ => anyhow::bail!("usage: toodle-backup [run-once <username>]"),
    }
}

/// Run the polling loop until a shutdown signal arrives.
async fn run_scheduler(
    store: Arc<dyn UserStore>,
    orchestrator: Arc<BackupOrchestrator>,
    config: &Config,
) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    Scheduler::new(store, orchestrator, config)
        .run(shutdown)
        .await;
    Ok(())
}

/// Back up a single user now, regardless of their schedule.
async fn run_once(
    store: Arc<dyn UserStore>,
    orchestrator: Arc<BackupOrchestrator>,
    username: &str,
) -> anyhow::Result<()> {
    let user = store
        .get_user(username)
        .await?
        .with_context(|| format!("User {} not found", username))?;

    let report = orchestrator.run(user).await?;
    tracing::info!(
        username = %report.username,
        delivered = report.delivered,
        "Manual backup finished"
    );
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("toodle_backup=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
