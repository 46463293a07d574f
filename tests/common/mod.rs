// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use toodle_backup::config::Config;
use toodle_backup::db::{FirestoreDb, MemoryUserStore, ScheduledUsers, UserStore};
use toodle_backup::error::{BackupError, Result};
use toodle_backup::models::{BackupTime, CloudAccount, TaskCredentials, User};
use toodle_backup::services::{BackupClients, BackupOrchestrator, CloudDelivery};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Config pointing every external service at the mock server.
#[allow(dead_code)]
pub fn test_config(server: &MockServer, artifact_dir: &Path) -> Config {
    Config {
        toodledo_api_url: format!("{}/3", server.uri()),
        toodledo_token_url: format!("{}/3/account/token.php", server.uri()),
        dropbox_token_url: format!("{}/oauth2/token", server.uri()),
        dropbox_content_url: format!("{}/2", server.uri()),
        artifact_dir: artifact_dir.to_path_buf(),
        ..Config::default()
    }
}

/// A schedulable user with one Dropbox account.
#[allow(dead_code)]
pub fn test_user(username: &str, hour: u32, minute: u32, categories: &[&str]) -> User {
    User {
        username: username.to_string(),
        backup_time: BackupTime {
            hour,
            minute,
            second: 0,
        },
        toodledo: TaskCredentials {
            access_token: format!("{}-stale-access", username),
            refresh_token: format!("{}-toodledo-refresh", username),
            categories: categories.iter().map(|c| c.to_string()).collect(),
        },
        clouds: vec![CloudAccount {
            provider: "Dropbox".to_string(),
            refresh_token: format!("{}-dropbox-refresh", username),
        }],
    }
}

/// Expected basic-auth header for a client id/secret pair.
#[allow(dead_code)]
pub fn basic_auth(client_id: &str, client_secret: &str) -> String {
    format!(
        "Basic {}",
        BASE64.encode(format!("{}:{}", client_id, client_secret))
    )
}

/// Mock a successful Toodledo refresh for one user.
#[allow(dead_code)]
pub async fn mock_toodledo_refresh(server: &MockServer, username: &str, scope: &str) {
    Mock::given(method("POST"))
        .and(path("/3/account/token.php"))
        .and(body_string_contains(format!(
            "refresh_token={}-toodledo-refresh",
            username
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": format!("{}-fresh-access", username),
            "refresh_token": format!("{}-rotated-refresh", username),
            "scope": scope,
            "token_type": "Bearer",
            "expires_in": 7200
        })))
        .mount(server)
        .await;
}

/// Mock a rejected Toodledo refresh for one user.
#[allow(dead_code)]
pub async fn mock_toodledo_refresh_rejected(server: &MockServer, username: &str) {
    Mock::given(method("POST"))
        .and(path("/3/account/token.php"))
        .and(body_string_contains(format!(
            "refresh_token={}-toodledo-refresh",
            username
        )))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"errorCode": 102, "errorDesc": "invalid_grant"})),
        )
        .mount(server)
        .await;
}

/// Mock a successful Dropbox refresh (Dropbox does not rotate refresh tokens).
#[allow(dead_code)]
pub async fn mock_dropbox_refresh(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "dropbox-fresh-access",
            "token_type": "bearer",
            "expires_in": 14400
        })))
        .mount(server)
        .await;
}

/// Mock one category export for the user's fresh access token.
#[allow(dead_code)]
pub async fn mock_category(server: &MockServer, username: &str, category: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/3/{}/get.php", category)))
        .and(query_param("access_token", format!("{}-fresh-access", username)))
        .and(query_param("f", "xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Mock one category export failing.
#[allow(dead_code)]
pub async fn mock_category_failure(server: &MockServer, category: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/3/{}/get.php", category)))
        .respond_with(ResponseTemplate::new(status).set_body_string("upstream failure"))
        .mount(server)
        .await;
}

/// Expect the Dropbox refresh to carry the configured client credentials.
#[allow(dead_code)]
pub fn dropbox_auth_header(config: &Config) -> wiremock::matchers::HeaderExactMatcher {
    header(
        "authorization",
        basic_auth(&config.dropbox_client_id, &config.dropbox_client_secret).as_str(),
    )
}

/// One recorded delivery call.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct DeliveryCall {
    pub path: PathBuf,
    pub access_token: String,
    /// Artifact contents at delivery time
    pub contents: String,
}

/// Delivery double that records calls and optionally fails.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingDelivery {
    calls: Mutex<Vec<DeliveryCall>>,
    fail: bool,
    attempts: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<DeliveryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloudDelivery for RecordingDelivery {
    async fn deliver(&self, path: &Path, access_token: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BackupError::Delivery("simulated upload failure".to_string()));
        }

        let contents = tokio::fs::read_to_string(path).await?;
        self.calls.lock().unwrap().push(DeliveryCall {
            path: path.to_path_buf(),
            access_token: access_token.to_string(),
            contents,
        });
        Ok(())
    }
}

/// Store whose broad query always fails.
#[allow(dead_code)]
pub struct UnavailableStore;

#[async_trait]
impl UserStore for UnavailableStore {
    async fn find_users_matching(&self, _hour: u32, _minute: u32) -> Result<ScheduledUsers> {
        Err(BackupError::Store("connection refused".to_string()))
    }

    async fn get_user(&self, _username: &str) -> Result<Option<User>> {
        Err(BackupError::Store("connection refused".to_string()))
    }

    async fn update_task_credentials(
        &self,
        _username: &str,
        _credentials: &TaskCredentials,
    ) -> Result<()> {
        Err(BackupError::Store("connection refused".to_string()))
    }
}

/// Build an orchestrator over the mock server with the given store and delivery.
#[allow(dead_code)]
pub fn orchestrator(
    config: &Config,
    store: Arc<dyn UserStore>,
    delivery: Arc<dyn CloudDelivery>,
) -> BackupOrchestrator {
    let mut clients = BackupClients::from_config(config).expect("clients should build");
    clients.delivery = delivery;
    BackupOrchestrator::new(store, clients, config)
}

/// Memory store shared as a trait object and as its concrete type.
#[allow(dead_code)]
pub fn memory_store(users: impl IntoIterator<Item = User>) -> Arc<MemoryUserStore> {
    Arc::new(MemoryUserStore::with_users(users))
}

/// Files left in the artifact directory.
#[allow(dead_code)]
pub fn residual_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}
