// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user backup orchestration.
//!
//! Handles one orchestration run:
//! 1. Refresh the Toodledo access token
//! 2. Store the refreshed credentials before anything else can fail
//! 3. Export every configured category into a local artifact
//! 4. Close the artifact envelope
//! 5. Refresh the cloud access token and deliver the artifact
//! 6. Delete the local artifact, whatever happened in step 5

use crate::config::Config;
use crate::db::UserStore;
use crate::error::{BackupError, BackupStep, Result, RunError};
use crate::models::{CloudAccount, TaskCredentials, User};
use crate::services::artifact::{artifact_path, Artifact, ArtifactWriter};
use crate::services::delivery::{CloudDelivery, CommandDelivery, DropboxDelivery};
use crate::services::oauth::OAuthClient;
use crate::services::toodledo::TaskExporter;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// External-service clients used by a run.
#[derive(Clone)]
pub struct BackupClients {
    pub toodledo_auth: OAuthClient,
    pub cloud_auth: OAuthClient,
    pub exporter: TaskExporter,
    pub delivery: Arc<dyn CloudDelivery>,
}

impl BackupClients {
    /// Build all clients from configuration.
    ///
    /// A configured `DELIVERY_COMMAND` selects the external uploader,
    /// otherwise artifacts are uploaded to Dropbox directly.
    pub fn from_config(config: &Config) -> Result<Self> {
        let delivery: Arc<dyn CloudDelivery> = match &config.delivery_command {
            Some(command) => Arc::new(CommandDelivery::new(
                command.clone(),
                config.delivery_timeout,
            )?),
            None => Arc::new(DropboxDelivery::new(
                config.dropbox_content_url.clone(),
                config.delivery_timeout,
            )?),
        };

        Ok(Self {
            toodledo_auth: OAuthClient::new(
                "Toodledo",
                config.toodledo_token_url.clone(),
                config.toodledo_client_id.clone(),
                config.toodledo_client_secret.clone(),
                config.http_timeout,
            )?,
            cloud_auth: OAuthClient::new(
                "Dropbox",
                config.dropbox_token_url.clone(),
                config.dropbox_client_id.clone(),
                config.dropbox_client_secret.clone(),
                config.http_timeout,
            )?,
            exporter: TaskExporter::new(config.toodledo_api_url.clone(), config.http_timeout)?,
            delivery,
        })
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub username: String,
    pub categories_exported: usize,
    pub bytes_written: u64,
    /// False when the user has no account with the configured provider.
    pub delivered: bool,
}

/// Runs the backup workflow for one user at a time.
///
/// Holds no per-run state, so one instance is shared by all concurrent runs.
pub struct BackupOrchestrator {
    store: Arc<dyn UserStore>,
    clients: BackupClients,
    artifact_dir: PathBuf,
    cloud_provider: String,
    cancel: CancellationToken,
}

impl BackupOrchestrator {
    pub fn new(store: Arc<dyn UserStore>, clients: BackupClients, config: &Config) -> Self {
        Self {
            store,
            clients,
            artifact_dir: config.artifact_dir.clone(),
            cloud_provider: config.cloud_provider.clone(),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort every in-flight run at its next external call.
    ///
    /// Aborted runs still delete their artifacts.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Run the full backup workflow for one user snapshot.
    pub async fn run(&self, user: User) -> std::result::Result<BackupReport, RunError> {
        let span = tracing::info_span!("backup_run", username = %user.username);

        async move {
            tracing::info!("Backing up user");
            let result = self.run_steps(&user).await;

            match &result {
                Ok(report) => tracing::info!(
                    categories = report.categories_exported,
                    bytes = report.bytes_written,
                    delivered = report.delivered,
                    "Backup complete"
                ),
                Err(e) if e.source.is_cancelled() => {
                    tracing::warn!(step = %e.step, "Backup cancelled")
                }
                Err(e) => tracing::error!(
                    step = %e.step,
                    http_status = e.source.http_status(),
                    error = %e.source,
                    "Backup failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_steps(&self, user: &User) -> std::result::Result<BackupReport, RunError> {
        let fail = |step: BackupStep| {
            let username = user.username.clone();
            move |source: BackupError| RunError {
                username,
                step,
                source,
            }
        };
        let started_at = Utc::now();

        // 1. Refresh the Toodledo access token
        let grant = self
            .guarded(
                self.clients
                    .toodledo_auth
                    .refresh(&user.toodledo.refresh_token),
            )
            .await
            .map_err(fail(BackupStep::RefreshTaskCredential))?;

        // 2. Persist the new pair (the old refresh token is spent)
        let credentials = TaskCredentials {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            categories: if grant.scopes.is_empty() {
                user.toodledo.categories.clone()
            } else {
                grant.scopes
            },
        };

        // Not raced against cancellation: dropping this write would lose the
        // only valid refresh token.
        self.store
            .update_task_credentials(&user.username, &credentials)
            .await
            .map_err(fail(BackupStep::PersistCredential))?;

        // 3-4. Export categories and close the envelope
        let (artifact, categories_exported) = self
            .export(user, &credentials.access_token, started_at)
            .await
            .map_err(fail(BackupStep::Export))?;

        // 5. Deliver to the linked cloud account
        let delivery = match user.cloud_account(&self.cloud_provider) {
            Some(account) => self.deliver(account, &artifact).await.map(|()| true),
            None => {
                tracing::warn!(
                    provider = %self.cloud_provider,
                    "No linked account for provider, skipping delivery"
                );
                Ok(false)
            }
        };

        // 6. Remove the local artifact unconditionally
        let bytes_written = artifact.len();
        let cleanup = artifact.remove().await;

        let delivered = delivery.map_err(|(step, source)| fail(step)(source))?;
        cleanup
            .map_err(BackupError::from)
            .map_err(fail(BackupStep::Cleanup))?;

        Ok(BackupReport {
            username: user.username.clone(),
            categories_exported,
            bytes_written,
            delivered,
        })
    }

    /// Stream every exportable category into a new artifact.
    ///
    /// On error the partially written artifact is dropped, which deletes it.
    async fn export(
        &self,
        user: &User,
        access_token: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(Artifact, usize)> {
        let path = artifact_path(&self.artifact_dir, &user.username, started_at);
        let mut writer = ArtifactWriter::open(path, started_at).await?;

        for category in user.exportable_categories() {
            let body = self
                .guarded(self.clients.exporter.fetch(category, access_token))
                .await?;
            let offset = writer.append_category(&body).await?;
            tracing::debug!(category, offset, bytes = body.len(), "Category appended");
        }

        let categories = writer.categories();
        let artifact = writer.close().await?;
        Ok((artifact, categories))
    }

    /// Refresh the cloud token and hand the artifact to the delivery transport.
    async fn deliver(
        &self,
        account: &CloudAccount,
        artifact: &Artifact,
    ) -> std::result::Result<(), (BackupStep, BackupError)> {
        let grant = self
            .guarded(self.clients.cloud_auth.refresh(&account.refresh_token))
            .await
            .map_err(|e| (BackupStep::RefreshCloudCredential, e))?;

        self.guarded(
            self.clients
                .delivery
                .deliver(artifact.path(), &grant.access_token),
        )
        .await
        .map_err(|e| (BackupStep::Deliver, e))?;

        tracing::info!(provider = %account.provider, "Artifact delivered");
        Ok(())
    }

    /// Race an external call against run cancellation.
    async fn guarded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BackupError::Cancelled),
            result = fut => result,
        }
    }
}
