//! Integration tests for listing, descriptor lookup and downloads

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use graphsync_core::domain::RemoteVersion;
use graphsync_remote::RemoteError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_list_files_maps_objects() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("POST"))
        .and(path("/get_all_files"))
        .and(header("authorization", "Bearer test-access-token"))
        .and(body_partial_json(serde_json::json!({ "GraphUUID": common::GRAPH })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Objects": [
                {
                    "Key": common::key(1).as_str(),
                    "Size": 120,
                    "Version": 3,
                    "Checksum": common::digest(1).as_str(),
                    "LastModified": "2026-01-15T10:00:00Z"
                },
                {
                    "Key": "plain-object-from-old-client",
                    "Size": 1,
                    "Version": 1,
                    "Checksum": common::digest(2).as_str()
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let files = client
        .list_files(&common::graph_id(), &common::token(), &common::cancel())
        .await
        .expect("listing failed");

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].encoded_path, common::key(1));
    assert_eq!(files[0].version, RemoteVersion::new(3));
    assert_eq!(files[0].size, 120);
    assert!(files[0].last_modified.is_some());
}

#[tokio::test]
async fn test_message_body_is_an_error() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("POST"))
        .and(path("/get_all_files"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "message": "Unauthorized" })),
        )
        .mount(&server)
        .await;

    let err = client
        .list_files(&common::graph_id(), &common::token(), &common::cancel())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unauthorized_status_is_fatal() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("POST"))
        .and(path("/get_all_files"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .list_files(&common::graph_id(), &common::token(), &common::cancel())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized(_)));
}

#[tokio::test]
async fn test_get_files_and_download() {
    let (server, client) = common::setup_mock().await;
    let body = vec![7u8; 200_000];

    Mock::given(method("POST"))
        .and(path("/get_files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Files": {
                (common::key(4).as_str()): {
                    "Url": format!("{}/blob/4", server.uri()),
                    "Size": body.len(),
                    "Version": 9,
                    "Checksum": common::digest(4).as_str()
                }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blob/4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let descriptors = client
        .get_files(
            &common::graph_id(),
            &common::token(),
            &[common::key(4), common::key(5)],
            &common::cancel(),
        )
        .await
        .unwrap();
    assert_eq!(descriptors.len(), 1);
    let descriptor = &descriptors[&common::key(4)];
    assert_eq!(descriptor.version, RemoteVersion::new(9));

    let seen = Arc::new(AtomicU64::new(0));
    let s = seen.clone();
    let bytes = client
        .download(
            &descriptor.url,
            descriptor.size,
            Arc::new(move |done, _total| {
                s.store(done, Ordering::SeqCst);
            }),
            &common::cancel(),
        )
        .await
        .unwrap();

    assert_eq!(bytes, body);
    assert_eq!(seen.load(Ordering::SeqCst), body.len() as u64);
}

#[tokio::test]
async fn test_get_files_with_no_keys_skips_request() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("POST"))
        .and(path("/get_files"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let descriptors = client
        .get_files(&common::graph_id(), &common::token(), &[], &common::cancel())
        .await
        .unwrap();
    assert!(descriptors.is_empty());
}

#[tokio::test]
async fn test_download_cancelled_before_start() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("GET"))
        .and(path("/blob/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 10]))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = common::cancel();
    cancel.cancel();
    let err = client
        .download(
            &format!("{}/blob/1", server.uri()),
            10,
            graphsync_core::ports::ignore_progress(),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Cancelled));
}

#[tokio::test]
async fn test_version_files_request_shape() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("POST"))
        .and(path("/get_version_files"))
        .and(body_partial_json(serde_json::json!({
            "Files": [{ "Key": common::key(3).as_str(), "VersionId": "v-17" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Files": {
                (common::key(3).as_str()): {
                    "Url": format!("{}/blob/v17", server.uri()),
                    "Size": 4,
                    "Version": 17,
                    "Checksum": common::digest(3).as_str()
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let descriptors = client
        .get_version_files(
            &common::graph_id(),
            &common::token(),
            &[(common::key(3), "v-17".to_string())],
            &common::cancel(),
        )
        .await
        .unwrap();
    assert_eq!(descriptors[&common::key(3)].version, RemoteVersion::new(17));
}
