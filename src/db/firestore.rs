// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the user-store operations the scheduler and orchestrator need:
//! - Users matching a backup minute (scheduler query)
//! - Single user lookup (manual trigger)
//! - Field-masked credential updates (orchestrator write-back)

use crate::db::{collections, ScheduledUsers, UserStore};
use crate::error::{BackupError, Result};
use crate::models::{TaskCredentials, User};
use async_trait::async_trait;
use firestore::FirestoreDocument;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};

/// Partial user document carrying only the Toodledo credentials.
#[derive(Debug, Serialize, Deserialize)]
struct CredentialPatch {
    toodledo: TaskCredentials,
}

/// Decode queried user documents one by one.
///
/// The account API owns these documents, so a malformed one is logged and
/// counted instead of failing the whole query.
fn decode_users(docs: &[FirestoreDocument]) -> ScheduledUsers {
    let mut scheduled = ScheduledUsers::default();

    for doc in docs {
        match firestore::FirestoreDb::deserialize_doc_to::<User>(doc) {
            Ok(user) => scheduled.users.push(user),
            Err(e) => {
                tracing::warn!(document = %doc.name, error = %e, "Skipping undecodable user document");
                scheduled.undecodable += 1;
            }
        }
    }

    scheduled
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| BackupError::Store(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            BackupError::Store(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| BackupError::Store("Database not connected (offline mode)".to_string()))
    }

    /// Create or replace a user document.
    ///
    /// The account API owns user documents; this exists for seeding and tests.
    pub async fn upsert_user(&self, user: &User) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.username)
            .object(user)
            .execute()
            .await
            .map_err(|e| BackupError::Store(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for FirestoreDb {
    async fn find_users_matching(&self, hour: u32, minute: u32) -> Result<ScheduledUsers> {
        let docs: Vec<FirestoreDocument> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| {
                q.for_all([
                    q.field("backup_time.hour").eq(hour),
                    q.field("backup_time.minute").eq(minute),
                ])
            })
            .stream_query_with_errors()
            .await
            .map_err(|e| BackupError::Store(e.to_string()))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| BackupError::Store(e.to_string()))?;

        let scheduled = decode_users(&docs);
        tracing::debug!(
            hour,
            minute,
            count = scheduled.users.len(),
            undecodable = scheduled.undecodable,
            "Queried users for backup minute"
        );
        Ok(scheduled)
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(username)
            .await
            .map_err(|e| BackupError::Store(e.to_string()))
    }

    async fn update_task_credentials(
        &self,
        username: &str,
        credentials: &TaskCredentials,
    ) -> Result<()> {
        let patch = CredentialPatch {
            toodledo: credentials.clone(),
        };

        // Only the `toodledo` field is written; the rest of the document is
        // owned by the account API.
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(["toodledo"])
            .in_col(collections::USERS)
            .document_id(username)
            .object(&patch)
            .execute()
            .await
            .map_err(|e| BackupError::Store(e.to_string()))?;

        tracing::debug!(username, "Stored refreshed Toodledo credentials");
        Ok(())
    }
}
