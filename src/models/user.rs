//! User model as stored in Firestore.
//!
//! User documents are created and edited by the account API; the backup
//! pipeline only reads them and writes back refreshed Toodledo credentials.

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Toodledo category that carries account info only and has no export body.
pub const BASIC_CATEGORY: &str = "basic";

/// User record stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct User {
    /// Unique username (also used as document ID)
    #[validate(length(min = 1))]
    pub username: String,
    /// Daily backup time of day, UTC
    #[validate(nested)]
    pub backup_time: BackupTime,
    /// Toodledo credential pair and the categories to export
    #[serde(default)]
    pub toodledo: TaskCredentials,
    /// Linked cloud storage accounts
    #[serde(default)]
    pub clouds: Vec<CloudAccount>,
}

impl User {
    /// True when the user has somewhere to deliver to and something to export.
    pub fn is_backup_eligible(&self) -> bool {
        !self.clouds.is_empty() && !self.toodledo.categories.is_empty()
    }

    /// True when the backup time falls on the given UTC hour and minute.
    pub fn is_scheduled_at(&self, hour: u32, minute: u32) -> bool {
        self.backup_time.hour == hour && self.backup_time.minute == minute
    }

    /// Configured categories that have a fetchable body, in configured order.
    pub fn exportable_categories(&self) -> impl Iterator<Item = &str> {
        self.toodledo
            .categories
            .iter()
            .map(String::as_str)
            .filter(|c| *c != BASIC_CATEGORY)
    }

    /// First linked cloud account for the given provider (case-insensitive).
    pub fn cloud_account(&self, provider: &str) -> Option<&CloudAccount> {
        self.clouds
            .iter()
            .find(|c| c.provider.eq_ignore_ascii_case(provider))
    }
}

/// Time of day at which a user's data is backed up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BackupTime {
    #[validate(range(max = 23))]
    pub hour: u32,
    #[validate(range(max = 59))]
    pub minute: u32,
    #[validate(range(max = 59))]
    #[serde(default)]
    pub second: u32,
}

/// Toodledo OAuth credential pair plus the categories granted for export.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCredentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Data categories to export (Toodledo scopes), in export order
    #[serde(default)]
    pub categories: Vec<String>,
}

impl fmt::Debug for TaskCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCredentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("categories", &self.categories)
            .finish()
    }
}

/// A linked cloud storage account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudAccount {
    /// Provider name, e.g. "Dropbox"
    pub provider: String,
    /// Long-lived OAuth refresh token
    pub refresh_token: String,
}

impl fmt::Debug for CloudAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudAccount")
            .field("provider", &self.provider)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}
