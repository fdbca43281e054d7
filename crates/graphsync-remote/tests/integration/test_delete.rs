//! Integration tests for idempotent deletes

use graphsync_core::domain::SyncError;
use graphsync_core::ports::{IRemoteStore, RemoteContext};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_delete_twice_succeeds_both_times() {
    let (server, client) = common::setup_mock().await;
    let key = common::key(1);

    Mock::given(method("POST"))
        .and(path("/delete_files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Deleted": [key.as_str()]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/delete_files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Failed": { (key.as_str()): { "Code": "NotFound" } }
        })))
        .mount(&server)
        .await;

    let ctx = RemoteContext::new(common::graph_id(), common::token(), common::cancel());
    for _ in 0..2 {
        let results = IRemoteStore::delete_files(&client, &ctx, &[key.clone()])
            .await
            .unwrap();
        assert!(results[&key].is_ok());
    }
}

#[tokio::test]
async fn test_delete_reports_other_failures_per_key() {
    let (server, client) = common::setup_mock().await;
    let gone = common::key(1);
    let locked = common::key(2);

    Mock::given(method("POST"))
        .and(path("/delete_files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Deleted": [gone.as_str()],
            "Failed": { (locked.as_str()): { "Code": "Forbidden", "Message": "read-only graph" } }
        })))
        .mount(&server)
        .await;

    let ctx = RemoteContext::new(common::graph_id(), common::token(), common::cancel());
    let results = IRemoteStore::delete_files(&client, &ctx, &[gone.clone(), locked.clone()])
        .await
        .unwrap();
    assert!(results[&gone].is_ok());
    assert!(matches!(results[&locked], Err(SyncError::PermissionDenied(_))));
}
