//! Integration tests for retry behavior per request class

use graphsync_core::domain::SyncError;
use graphsync_core::ports::{IRemoteStore, RemoteContext};
use graphsync_remote::RemoteError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_read_retries_server_error() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("POST"))
        .and(path("/get_all_files"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/get_all_files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Objects": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let files = client
        .list_files(&common::graph_id(), &common::token(), &common::cancel())
        .await
        .unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn test_read_honors_retry_after() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("POST"))
        .and(path("/get_all_files"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/get_all_files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Objects": [] })))
        .mount(&server)
        .await;

    assert!(client
        .list_files(&common::graph_id(), &common::token(), &common::cancel())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_write_server_error_is_not_retried() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("POST"))
        .and(path("/delete_files"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = RemoteContext::new(common::graph_id(), common::token(), common::cancel());
    let err = IRemoteStore::delete_files(&client, &ctx, &[common::key(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NetworkTransient(_)));
}

#[tokio::test]
async fn test_write_throttled_is_not_resent() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("POST"))
        .and(path("/delete_files"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = RemoteContext::new(common::graph_id(), common::token(), common::cancel());
    let err = IRemoteStore::delete_files(&client, &ctx, &[common::key(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NetworkTransient(_)));
}

#[tokio::test]
async fn test_read_gives_up_after_policy() {
    let (server, client) = common::setup_mock().await;

    Mock::given(method("POST"))
        .and(path("/get_files"))
        .respond_with(ResponseTemplate::new(502))
        .expect(4)
        .mount(&server)
        .await;

    let err = client
        .get_files(
            &common::graph_id(),
            &common::token(),
            &[common::key(1)],
            &common::cancel(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::ServerError(_)));
}
