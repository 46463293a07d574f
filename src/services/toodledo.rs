// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Toodledo API client for exporting a user's data.
//!
//! Each data category (tasks, notes, outlines, ...) is fetched with one
//! authenticated GET in Toodledo's XML format.

use crate::error::{BackupError, Result};
use std::time::Duration;

/// Full field list requested for the `tasks` category.
const TASK_FIELDS: &str = "folder, context, goal, location, tag, startdate, duedate, duedatemod, starttime, duetime, remind, repeat, status, star, priority, length, timer, added, note, parent, children, order, meta, previous, attachment, shared, addedby, via, attachments";

/// Export format requested from Toodledo.
const EXPORT_FORMAT: &str = "xml";

/// Toodledo category export client.
#[derive(Clone)]
pub struct TaskExporter {
    http: reqwest::Client,
    base_url: String,
}

impl TaskExporter {
    /// Create an exporter for the given API base (e.g. `https://api.toodledo.com/3`).
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackupError::Internal(anyhow::anyhow!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the raw export body of one category.
    pub async fn fetch(&self, category: &str, access_token: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}/get.php", self.base_url, urlencoding::encode(category));

        let mut query = vec![("access_token", access_token), ("f", EXPORT_FORMAT)];
        if category == "tasks" {
            query.push(("fields", TASK_FIELDS));
        }

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| BackupError::Fetch {
                category: category.to_string(),
                status: None,
                // The request URL carries the token; keep only the cause.
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackupError::Fetch {
                category: category.to_string(),
                status: Some(status.as_u16()),
                message: body.chars().take(200).collect(),
            });
        }

        let body = response.bytes().await.map_err(|e| BackupError::Fetch {
            category: category.to_string(),
            status: Some(status.as_u16()),
            message: e.without_url().to_string(),
        })?;

        tracing::debug!(category, bytes = body.len(), "Fetched category export");
        Ok(body.to_vec())
    }
}
