//! User store layer (Firestore in production, in-memory for tests).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryUserStore;

use crate::error::Result;
use crate::models::{TaskCredentials, User};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
}

/// Users found by a schedule query.
#[derive(Debug, Default)]
pub struct ScheduledUsers {
    pub users: Vec<User>,
    /// Stored records that matched but could not be read as a user
    pub undecodable: usize,
}

impl From<Vec<User>> for ScheduledUsers {
    fn from(users: Vec<User>) -> Self {
        Self {
            users,
            undecodable: 0,
        }
    }
}

/// The user-store operations the backup pipeline depends on.
///
/// Implementations must be safe to share between the scheduler loop and
/// any number of concurrent orchestration runs.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users whose backup time falls on the given UTC hour and minute.
    ///
    /// A malformed record is counted in `undecodable` and must not hide the
    /// other users of that minute.
    async fn find_users_matching(&self, hour: u32, minute: u32) -> Result<ScheduledUsers>;

    /// Get a single user by username.
    async fn get_user(&self, username: &str) -> Result<Option<User>>;

    /// Replace the stored Toodledo credential pair of one user.
    async fn update_task_credentials(
        &self,
        username: &str,
        credentials: &TaskCredentials,
    ) -> Result<()>;
}
