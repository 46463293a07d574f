// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth refresh-token client shared by Toodledo and Dropbox.
//!
//! Exchanges a long-lived refresh token for a short-lived access token at a
//! provider's token endpoint, authenticating the client with HTTP basic auth.

use crate::error::{BackupError, Result};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 200;

/// Refresh-token client for one OAuth provider.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    service: &'static str,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthClient {
    /// Create a client for the provider's token endpoint.
    ///
    /// `service` names the provider in logs and errors.
    pub fn new(
        service: &'static str,
        token_url: String,
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackupError::Internal(anyhow::anyhow!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            service,
            token_url,
            client_id,
            client_secret,
        })
    }

    /// Refresh an access token.
    ///
    /// Providers that do not rotate refresh tokens (Dropbox) omit one from
    /// the response; the presented token is carried forward in that case.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| self.error(format!("Token refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(service = self.service, status = %status, "Token refresh rejected");
            return Err(self.error(format!("HTTP {}: {}", status, truncate(&body))));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("Failed to parse token response: {}", e)))?;

        if parsed.access_token.is_empty() {
            return Err(self.error("Token response has an empty access_token".to_string()));
        }

        tracing::debug!(
            service = self.service,
            expires_in = parsed.expires_in,
            "Access token refreshed"
        );

        Ok(TokenGrant {
            access_token: parsed.access_token,
            refresh_token: parsed
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| refresh_token.to_string()),
            scopes: parsed
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            expires_in: parsed.expires_in,
        })
    }

    fn error(&self, message: String) -> BackupError {
        BackupError::Credential {
            service: self.service,
            message,
        }
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Raw token endpoint response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Credentials issued by a successful refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Granted scopes, empty if the provider did not report any
    pub scopes: Vec<String>,
    /// Access token lifetime in seconds
    pub expires_in: Option<i64>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
