// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and kept in memory; the `Debug`
//! output of [`Config`] never contains them.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    // --- Toodledo (task service) ---
    /// OAuth client ID registered with Toodledo
    pub toodledo_client_id: String,
    /// Toodledo API base, e.g. `https://api.toodledo.com/3`
    pub toodledo_api_url: String,
    /// Toodledo token endpoint
    pub toodledo_token_url: String,

    // --- Dropbox (cloud service) ---
    /// OAuth client ID registered with Dropbox
    pub dropbox_client_id: String,
    /// Dropbox token endpoint
    pub dropbox_token_url: String,
    /// Dropbox content API base (native uploads)
    pub dropbox_content_url: String,
    /// Provider name a linked cloud account must carry to be used
    pub cloud_provider: String,
    /// External delivery command; `None` selects the native Dropbox upload
    pub delivery_command: Option<Vec<String>>,

    // --- Storage ---
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Directory holding in-progress artifacts
    pub artifact_dir: PathBuf,

    // --- Scheduling ---
    pub poll_interval: Duration,
    pub max_concurrent_backups: usize,
    pub max_catch_up_minutes: u32,
    pub http_timeout: Duration,
    pub delivery_timeout: Duration,
    pub shutdown_grace: Duration,

    // --- Secrets ---
    /// Toodledo OAuth client secret
    pub toodledo_client_secret: String,
    /// Dropbox OAuth client secret
    pub dropbox_client_secret: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            toodledo_client_id: "test_toodledo_id".to_string(),
            toodledo_api_url: "http://localhost:9999/3".to_string(),
            toodledo_token_url: "http://localhost:9999/3/account/token.php".to_string(),
            dropbox_client_id: "test_dropbox_id".to_string(),
            dropbox_token_url: "http://localhost:9999/oauth2/token".to_string(),
            dropbox_content_url: "http://localhost:9999/2".to_string(),
            cloud_provider: "Dropbox".to_string(),
            delivery_command: None,
            gcp_project_id: "test-project".to_string(),
            artifact_dir: env::temp_dir(),
            poll_interval: Duration::from_secs(60),
            max_concurrent_backups: 8,
            max_catch_up_minutes: 5,
            http_timeout: Duration::from_secs(30),
            delivery_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(120),
            toodledo_client_secret: "test_toodledo_secret".to_string(),
            dropbox_client_secret: "test_dropbox_secret".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honoured for local
    /// development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            toodledo_client_id: required("TOODLEDO_CLIENT_ID")?,
            toodledo_api_url: optional("TOODLEDO_API_URL", "https://api.toodledo.com/3"),
            toodledo_token_url: optional(
                "TOODLEDO_TOKEN_URL",
                "https://api.toodledo.com/3/account/token.php",
            ),
            dropbox_client_id: required("DROPBOX_CLIENT_ID")?,
            dropbox_token_url: optional(
                "DROPBOX_TOKEN_URL",
                "https://api.dropboxapi.com/oauth2/token",
            ),
            dropbox_content_url: optional(
                "DROPBOX_CONTENT_URL",
                "https://content.dropboxapi.com/2",
            ),
            cloud_provider: optional("CLOUD_PROVIDER", "Dropbox"),
            delivery_command: env::var("DELIVERY_COMMAND")
                .ok()
                .map(|cmd| parse_command(&cmd))
                .filter(|parts| !parts.is_empty()),
            gcp_project_id: optional("GCP_PROJECT_ID", "local-dev"),
            artifact_dir: env::var("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            poll_interval: Duration::from_secs(parsed("POLL_INTERVAL_SECS", 60)?),
            max_concurrent_backups: parsed("MAX_CONCURRENT_BACKUPS", 8)?,
            max_catch_up_minutes: parsed("MAX_CATCH_UP_MINUTES", 5)?,
            http_timeout: Duration::from_secs(parsed("HTTP_TIMEOUT_SECS", 30)?),
            delivery_timeout: Duration::from_secs(parsed("DELIVERY_TIMEOUT_SECS", 300)?),
            shutdown_grace: Duration::from_secs(parsed("SHUTDOWN_GRACE_SECS", 120)?),

            toodledo_client_secret: required("TOODLEDO_CLIENT_SECRET")?,
            dropbox_client_secret: required("DROPBOX_CLIENT_SECRET")?,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("toodledo_client_id", &self.toodledo_client_id)
            .field("toodledo_api_url", &self.toodledo_api_url)
            .field("toodledo_token_url", &self.toodledo_token_url)
            .field("dropbox_client_id", &self.dropbox_client_id)
            .field("dropbox_token_url", &self.dropbox_token_url)
            .field("dropbox_content_url", &self.dropbox_content_url)
            .field("cloud_provider", &self.cloud_provider)
            .field("delivery_command", &self.delivery_command)
            .field("gcp_project_id", &self.gcp_project_id)
            .field("artifact_dir", &self.artifact_dir)
            .field("poll_interval", &self.poll_interval)
            .field("max_concurrent_backups", &self.max_concurrent_backups)
            .field("max_catch_up_minutes", &self.max_catch_up_minutes)
            .field("http_timeout", &self.http_timeout)
            .field("delivery_timeout", &self.delivery_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("toodledo_client_secret", &"<redacted>")
            .field("dropbox_client_secret", &"<redacted>")
            .finish()
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Split a delivery command line on whitespace.
fn parse_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
