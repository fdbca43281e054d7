//! Integration tests for uploads and compare-and-swap commits

use std::collections::HashMap;
use std::sync::Arc;

use graphsync_core::domain::{RemoteVersion, SyncError};
use graphsync_core::ports::{ignore_progress, IRemoteStore, RemoteContext, UploadRequest};
use graphsync_remote::types::UpdateEntry;
use graphsync_remote::RemoteError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

async fn mount_temp_upload(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path("/temp_files"))
        .and(header("content-type", "application/octet-stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "TempKey": "tmp/abc" })),
        )
        .mount(server)
        .await;
}

fn context() -> RemoteContext {
    RemoteContext::new(common::graph_id(), common::token(), common::cancel())
}

#[tokio::test]
async fn test_upload_commits_with_expected_version() {
    let (server, client) = common::setup_mock().await;
    mount_temp_upload(&server).await;

    let key = common::key(1);
    Mock::given(method("POST"))
        .and(path("/update_files"))
        .and(body_partial_json(serde_json::json!({
            "Files": { (key.as_str()): { "TempKey": "tmp/abc", "ExpectedVersion": 4, "Size": 3 } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Updated": { (key.as_str()): 5 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let version = IRemoteStore::upload(
        &client,
        &context(),
        UploadRequest {
            encoded_path: key,
            body: b"abc".to_vec(),
            checksum: common::digest(1),
            expected_version: Some(RemoteVersion::new(4)),
        },
        ignore_progress(),
    )
    .await
    .unwrap();
    assert_eq!(version, RemoteVersion::new(5));
}

#[tokio::test]
async fn test_upload_conflict_is_reported_not_retried() {
    let (server, client) = common::setup_mock().await;
    mount_temp_upload(&server).await;

    Mock::given(method("POST"))
        .and(path("/update_files"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(serde_json::json!({ "CurrentVersion": 8 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = IRemoteStore::upload(
        &client,
        &context(),
        UploadRequest {
            encoded_path: common::key(2),
            body: vec![0u8; 10],
            checksum: common::digest(2),
            expected_version: Some(RemoteVersion::ABSENT),
        },
        ignore_progress(),
    )
    .await
    .unwrap_err();

    match err {
        SyncError::VersionConflict {
            path,
            expected,
            actual,
        } => {
            assert_eq!(path, common::key(2).as_str());
            assert_eq!(expected, RemoteVersion::ABSENT);
            assert_eq!(actual, RemoteVersion::new(8));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_batch_commit_reports_per_key() {
    let (server, client) = common::setup_mock().await;

    let ok = common::key(1);
    let stale = common::key(2);
    Mock::given(method("POST"))
        .and(path("/update_files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Updated": { (ok.as_str()): 2 },
            "Failed": {
                (stale.as_str()): { "Code": "VersionConflict", "CurrentVersion": 6 }
            }
        })))
        .mount(&server)
        .await;

    let mut entries = HashMap::new();
    for (k, expected) in [(&ok, 1), (&stale, 5)] {
        entries.insert(
            k.clone(),
            UpdateEntry {
                temp_key: format!("tmp/{k}"),
                checksum: common::digest(9).to_string(),
                size: 1,
                expected_version: Some(expected),
            },
        );
    }

    let results = client
        .update_files(&common::graph_id(), &common::token(), entries, &common::cancel())
        .await
        .unwrap();

    assert_eq!(results[&ok].as_ref().unwrap(), &RemoteVersion::new(2));
    assert!(matches!(
        results[&stale],
        Err(RemoteError::VersionConflict { expected, actual, .. })
            if expected == RemoteVersion::new(5) && actual == RemoteVersion::new(6)
    ));
}

#[tokio::test]
async fn test_upload_sends_whole_body() {
    let (server, client) = common::setup_mock().await;
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    Mock::given(method("PUT"))
        .and(path("/temp_files"))
        .and(wiremock::matchers::body_bytes(body.clone()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "TempKey": "tmp/big" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let temp = client
        .upload_temp(
            &common::token(),
            Arc::new(body),
            ignore_progress(),
            &common::cancel(),
        )
        .await
        .unwrap();
    assert_eq!(temp, "tmp/big");
}
