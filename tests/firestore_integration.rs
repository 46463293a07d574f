// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running and
//! FIRESTORE_EMULATOR_HOST pointing at it.
//!
//! The emulator keeps state between tests, so every test uses unique
//! usernames and backup minutes derived from the clock.

use toodle_backup::db::{FirestoreDb, UserStore};
use toodle_backup::error::BackupError;
use toodle_backup::models::TaskCredentials;

mod common;
use common::{test_db, test_user};

/// Unique username and (hour, minute) slot for test isolation.
fn unique_slot(prefix: &str) -> (String, u32, u32) {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let slot = (nanos / 1_000) % (24 * 60);
    (
        format!("{}-{}", prefix, nanos),
        (slot / 60) as u32,
        (slot % 60) as u32,
    )
}

#[tokio::test]
async fn test_user_round_trip() {
    require_emulator!();

    let db = test_db().await;
    let (username, hour, minute) = unique_slot("roundtrip");

    assert!(db.get_user(&username).await.unwrap().is_none());

    let user = test_user(&username, hour, minute, &["basic", "tasks"]);
    db.upsert_user(&user).await.unwrap();

    let fetched = db.get_user(&username).await.unwrap().expect("user stored");
    assert_eq!(fetched.username, username);
    assert_eq!(fetched.backup_time, user.backup_time);
    assert_eq!(fetched.toodledo, user.toodledo);
    assert_eq!(fetched.clouds, user.clouds);
}

#[tokio::test]
async fn test_find_users_matches_hour_and_minute() {
    require_emulator!();

    let db = test_db().await;
    let (username, hour, minute) = unique_slot("matching");
    let next_minute = (minute + 1) % 60;

    db.upsert_user(&test_user(&username, hour, minute, &["tasks"]))
        .await
        .unwrap();
    let (other, _, _) = unique_slot("neighbour");
    db.upsert_user(&test_user(&other, hour, next_minute, &["tasks"]))
        .await
        .unwrap();

    let matched = db.find_users_matching(hour, minute).await.unwrap();
    let names: Vec<_> = matched.users.iter().map(|u| u.username.as_str()).collect();
    assert!(names.contains(&username.as_str()));
    assert!(!names.contains(&other.as_str()));

    let neighbours = db.find_users_matching(hour, next_minute).await.unwrap();
    assert!(neighbours.users.iter().any(|u| u.username == other));
}

#[tokio::test]
async fn test_credential_update_only_touches_credentials() {
    require_emulator!();

    let db = test_db().await;
    let (username, hour, minute) = unique_slot("update");
    let user = test_user(&username, hour, minute, &["tasks"]);
    db.upsert_user(&user).await.unwrap();

    let refreshed = TaskCredentials {
        access_token: "new-access".to_string(),
        refresh_token: "new-refresh".to_string(),
        categories: vec!["basic".to_string(), "tasks".to_string(), "notes".to_string()],
    };
    db.update_task_credentials(&username, &refreshed)
        .await
        .unwrap();

    let fetched = db.get_user(&username).await.unwrap().unwrap();
    assert_eq!(fetched.toodledo, refreshed);
    // Schedule and cloud accounts are left alone
    assert_eq!(fetched.backup_time, user.backup_time);
    assert_eq!(fetched.clouds, user.clouds);
}

#[tokio::test]
async fn test_offline_store_reports_store_errors() {
    let db = FirestoreDb::new_mock();

    assert!(matches!(
        db.find_users_matching(9, 0).await,
        Err(BackupError::Store(_))
    ));
    assert!(matches!(db.get_user("alice").await, Err(BackupError::Store(_))));
}
