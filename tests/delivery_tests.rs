// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tests for the artifact delivery transports.

use std::time::Duration;
use toodle_backup::error::BackupError;
use toodle_backup::services::{CloudDelivery, CommandDelivery, DropboxDelivery};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn words(cmd: &[&str]) -> Vec<String> {
    cmd.iter().map(|w| w.to_string()).collect()
}

fn write_artifact(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

// ═══════════════════════════════════════════════════════════════════════════
// COMMAND DELIVERY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_empty_command_is_rejected() {
    let result = CommandDelivery::new(Vec::new(), Duration::from_secs(1));
    assert!(matches!(result, Err(BackupError::Delivery(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_receives_path_then_token() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(&dir, "alice_20260101T090000Z.xml", "<xml></xml>");

    // Succeeds only if $1 is an existing file and $2 is the token.
    let delivery = CommandDelivery::new(
        words(&["sh", "-c", r#"test -f "$1" && test "$2" = "dbx-token""#, "upload"]),
        Duration::from_secs(10),
    )
    .unwrap();

    delivery.deliver(&artifact, "dbx-token").await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_nonzero_exit_is_delivery_error() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(&dir, "bob.xml", "<xml></xml>");

    let delivery = CommandDelivery::new(
        words(&["sh", "-c", "echo 'ERROR: User may be out of space.' >&2; exit 1", "upload"]),
        Duration::from_secs(10),
    )
    .unwrap();

    let err = delivery.deliver(&artifact, "dbx-token").await.unwrap_err();
    match err {
        BackupError::Delivery(message) => assert!(message.contains("out of space"), "{}", message),
        other => panic!("expected Delivery error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_program_is_delivery_error() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(&dir, "carol.xml", "<xml></xml>");

    let delivery = CommandDelivery::new(
        words(&["definitely-not-an-uploader-binary"]),
        Duration::from_secs(10),
    )
    .unwrap();

    let err = delivery.deliver(&artifact, "dbx-token").await.unwrap_err();
    assert!(matches!(err, BackupError::Delivery(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_hung_command_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(&dir, "dave.xml", "<xml></xml>");

    let delivery = CommandDelivery::new(
        words(&["sh", "-c", "sleep 30", "upload"]),
        Duration::from_millis(200),
    )
    .unwrap();

    let started = std::time::Instant::now();
    let err = delivery.deliver(&artifact, "dbx-token").await.unwrap_err();
    assert!(matches!(err, BackupError::Delivery(ref m) if m.contains("timed out")));
    assert!(started.elapsed() < Duration::from_secs(10));
}

// ═══════════════════════════════════════════════════════════════════════════
// DROPBOX DELIVERY
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_dropbox_upload_sends_file_with_bearer_token() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(&dir, "alice_20260101T090000Z.xml", "<xml><a/></xml>");

    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .and(header("authorization", "Bearer dbx-token"))
        .and(header("content-type", "application/octet-stream"))
        .and(body_string("<xml><a/></xml>"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "alice_20260101T090000Z.xml"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let delivery =
        DropboxDelivery::new(format!("{}/2", server.uri()), Duration::from_secs(5)).unwrap();
    delivery.deliver(&artifact, "dbx-token").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let api_arg: serde_json::Value = serde_json::from_str(
        requests[0]
            .headers
            .get("Dropbox-API-Arg")
            .expect("Dropbox-API-Arg header")
            .to_str()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(api_arg["path"], "/alice_20260101T090000Z.xml");
    assert_eq!(api_arg["mode"], "overwrite");
}

#[tokio::test]
async fn test_dropbox_rejection_is_delivery_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(&dir, "bob.xml", "<xml></xml>");

    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .respond_with(ResponseTemplate::new(409).set_body_string(
            r#"{"error_summary": "path/insufficient_space/"}"#,
        ))
        .mount(&server)
        .await;

    let delivery =
        DropboxDelivery::new(format!("{}/2", server.uri()), Duration::from_secs(5)).unwrap();
    let err = delivery.deliver(&artifact, "dbx-token").await.unwrap_err();

    match err {
        BackupError::Delivery(message) => {
            assert!(message.contains("409"));
            assert!(message.contains("insufficient_space"));
        }
        other => panic!("expected Delivery error, got {:?}", other),
    }
}
