// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory user store for tests and offline runs.

use crate::db::{ScheduledUsers, UserStore};
use crate::error::{BackupError, Result};
use crate::models::{TaskCredentials, User};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// User store backed by a concurrent map keyed by username.
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, User>,
    credential_writes: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given users.
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let store = Self::new();
        for user in users {
            store.insert(user);
        }
        store
    }

    /// Insert or replace a user.
    pub fn insert(&self, user: User) {
        self.users.insert(user.username.clone(), user);
    }

    /// Snapshot of a stored user.
    pub fn snapshot(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|u| u.clone())
    }

    /// Number of credential updates applied so far.
    pub fn credential_writes(&self) -> usize {
        self.credential_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_users_matching(&self, hour: u32, minute: u32) -> Result<ScheduledUsers> {
        let users: Vec<User> = self
            .users
            .iter()
            .filter(|entry| entry.is_scheduled_at(hour, minute))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(users.into())
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self.snapshot(username))
    }

    async fn update_task_credentials(
        &self,
        username: &str,
        credentials: &TaskCredentials,
    ) -> Result<()> {
        let mut user = self
            .users
            .get_mut(username)
            .ok_or_else(|| BackupError::NotFound(format!("User {}", username)))?;
        user.toodledo = credentials.clone();
        self.credential_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
