// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for the backup pipeline.

use std::fmt;

/// Error raised by a single component of the backup pipeline.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("{service} credential refresh failed: {message}")]
    Credential {
        service: &'static str,
        message: String,
    },

    #[error("Fetching category '{category}' failed{}: {message}", status_suffix(.status))]
    Fetch {
        category: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("User store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Artifact I/O error: {0}")]
    Artifact(#[from] std::io::Error),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with HTTP {}", code),
        None => String::new(),
    }
}

impl BackupError {
    /// HTTP status attached to a fetch failure, if the server answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            BackupError::Fetch { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackupError::Cancelled)
    }
}

/// Step of an orchestration run, used to tag failures in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStep {
    RefreshTaskCredential,
    PersistCredential,
    Export,
    RefreshCloudCredential,
    Deliver,
    Cleanup,
}

impl fmt::Display for BackupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupStep::RefreshTaskCredential => "refresh_task_credential",
            BackupStep::PersistCredential => "persist_credential",
            BackupStep::Export => "export",
            BackupStep::RefreshCloudCredential => "refresh_cloud_credential",
            BackupStep::Deliver => "deliver",
            BackupStep::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Failure of one user's orchestration run.
#[derive(Debug, thiserror::Error)]
#[error("Backup for '{username}' failed at {step}: {source}")]
pub struct RunError {
    pub username: String,
    pub step: BackupStep,
    #[source]
    pub source: BackupError,
}

/// Result type alias for pipeline components
pub type Result<T> = std::result::Result<T, BackupError>;
