// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Delivery of finished artifacts to cloud storage.
//!
//! The orchestrator only knows [`CloudDelivery`]: hand over a local path and
//! a fresh access token, get success or failure back. Two transports exist:
//! - [`CommandDelivery`] runs an external uploader process
//! - [`DropboxDelivery`] uploads natively through the Dropbox content API

use crate::error::{BackupError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Transport that puts an artifact into the user's cloud storage.
#[async_trait]
pub trait CloudDelivery: Send + Sync {
    async fn deliver(&self, path: &Path, access_token: &str) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// CommandDelivery - external uploader process
// ─────────────────────────────────────────────────────────────────────────────

/// Runs `program [args..] <path> <access_token>` and checks the exit status.
#[derive(Debug, Clone)]
pub struct CommandDelivery {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandDelivery {
    /// Build from a command line split into words (program first).
    pub fn new(command: Vec<String>, timeout: Duration) -> Result<Self> {
        let mut words = command.into_iter();
        let program = words
            .next()
            .ok_or_else(|| BackupError::Delivery("Empty delivery command".to_string()))?;

        Ok(Self {
            program,
            args: words.collect(),
            timeout,
        })
    }
}

#[async_trait]
impl CloudDelivery for CommandDelivery {
    async fn deliver(&self, path: &Path, access_token: &str) -> Result<()> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .arg(access_token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BackupError::Delivery(format!("Failed to start '{}': {}", self.program, e))
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                BackupError::Delivery(format!(
                    "'{}' timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| BackupError::Delivery(format!("'{}' failed: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackupError::Delivery(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        tracing::debug!(program = %self.program, path = %path.display(), "Delivery command succeeded");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DropboxDelivery - native upload
// ─────────────────────────────────────────────────────────────────────────────

/// `Dropbox-API-Arg` header of an upload.
#[derive(Serialize)]
struct UploadArg {
    path: String,
    mode: &'static str,
}

/// Uploads artifacts to the root of the user's Dropbox app folder.
#[derive(Clone)]
pub struct DropboxDelivery {
    http: reqwest::Client,
    content_url: String,
}

impl DropboxDelivery {
    /// Create a client for the content API base (e.g. `https://content.dropboxapi.com/2`).
    pub fn new(content_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackupError::Internal(anyhow::anyhow!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            content_url: content_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CloudDelivery for DropboxDelivery {
    async fn deliver(&self, path: &Path, access_token: &str) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BackupError::Delivery(format!("Invalid artifact path {:?}", path)))?;

        let api_arg = serde_json::to_string(&UploadArg {
            path: format!("/{}", file_name),
            mode: "overwrite",
        })
        .map_err(|e| BackupError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;

        let body = tokio::fs::read(path).await?;

        let response = self
            .http
            .post(format!("{}/files/upload", self.content_url))
            .bearer_auth(access_token)
            .header("Dropbox-API-Arg", api_arg)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| BackupError::Delivery(format!("Dropbox upload failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            // 409 with insufficient_space is the common "user is out of space" case.
            return Err(BackupError::Delivery(format!(
                "Dropbox upload rejected with HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        tracing::debug!(file = file_name, "Uploaded artifact to Dropbox");
        Ok(())
    }
}
