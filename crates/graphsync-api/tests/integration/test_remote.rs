//! Transfers through the context: fetch, update, CAS, delete, reconcile

use std::sync::Arc;

use graphsync_api::Applied;
use graphsync_core::domain::{RemoteVersion, SyncError};

use crate::common::{fixture, rel, TOKEN};

#[tokio::test]
async fn test_upload_then_fetch_round_trip() {
    let fx = fixture();
    fx.write("pages/a.md", b"- first block");

    let report = fx
        .ctx
        .update_remote_files(&fx.graph_id, fx.root(), &["pages/a.md"], TOKEN)
        .await
        .unwrap();
    assert_eq!(report.items[0].result, Ok(Applied::Uploaded(RemoteVersion::new(1))));
    assert_eq!(fx.remote_content("pages/a.md").unwrap(), b"- first block");

    std::fs::remove_file(fx.file("pages/a.md")).unwrap();
    let report = fx
        .ctx
        .fetch_remote_files(&fx.graph_id, fx.root(), &["pages/a.md"], TOKEN)
        .await
        .unwrap();
    assert_eq!(report.items[0].result, Ok(Applied::Downloaded(RemoteVersion::new(1))));
    assert_eq!(fx.read("pages/a.md").unwrap(), b"- first block");
    assert!(fx.remote.tokens_seen.lock().unwrap().iter().all(|t| t == TOKEN));
}

#[tokio::test]
async fn test_update_remote_uses_acked_version() {
    let fx = fixture();
    fx.write("a.md", b"v1");
    fx.ctx
        .update_remote_files(&fx.graph_id, fx.root(), &["a.md"], TOKEN)
        .await
        .unwrap();

    fx.write("a.md", b"v2");
    let report = fx
        .ctx
        .update_remote_files(&fx.graph_id, fx.root(), &["a.md"], TOKEN)
        .await
        .unwrap();

    assert_eq!(report.items[0].result, Ok(Applied::Uploaded(RemoteVersion::new(2))));
    assert_eq!(fx.remote_content("a.md").unwrap(), b"v2");
}

#[tokio::test]
async fn test_never_synced_upload_does_not_overwrite_remote() {
    let fx = fixture();
    fx.seed_remote("a.md", b"someone else's", 4);
    fx.write("a.md", b"mine");

    let report = fx
        .ctx
        .update_remote_files(&fx.graph_id, fx.root(), &["a.md"], TOKEN)
        .await
        .unwrap();

    assert_eq!(
        report.items[0].result,
        Err(SyncError::VersionConflict {
            path: "a.md".to_string(),
            expected: RemoteVersion::ABSENT,
            actual: RemoteVersion::new(4),
        })
    );
    assert_eq!(fx.remote_content("a.md").unwrap(), b"someone else's");
}

#[tokio::test]
async fn test_cas_single_file() {
    let fx = fixture();
    fx.seed_remote("a.md", b"v3", 3);
    fx.write("a.md", b"v4");

    let stale = fx
        .ctx
        .update_remote_file_with_version(&fx.graph_id, fx.root(), "a.md", 2, TOKEN)
        .await;
    assert!(matches!(stale, Err(SyncError::VersionConflict { .. })));

    let fresh = fx
        .ctx
        .update_remote_file_with_version(&fx.graph_id, fx.root(), "a.md", 3, TOKEN)
        .await
        .unwrap();
    assert_eq!(fresh, RemoteVersion::new(4));
}

#[tokio::test]
async fn test_concurrent_stale_updates_at_most_one_wins() {
    let fx = Arc::new(fixture());
    fx.seed_remote("a.md", b"v1", 1);
    fx.write("a.md", b"v2");

    let calls = (0..4).map(|_| {
        let fx = fx.clone();
        tokio::spawn(async move {
            fx.ctx
                .update_remote_file_with_version(&fx.graph_id, fx.root(), "a.md", 1, TOKEN)
                .await
        })
    });
    let mut ok = 0;
    let mut conflicts = 0;
    for call in calls.collect::<Vec<_>>() {
        match call.await.unwrap() {
            Ok(_) => ok += 1,
            Err(SyncError::VersionConflict { .. }) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(conflicts, 3);
    assert_eq!(fx.remote_version("a.md"), Some(RemoteVersion::new(2)));
}

#[tokio::test]
async fn test_delete_remote_twice_both_succeed() {
    let fx = fixture();
    fx.seed_remote("a.md", b"x", 1);

    for _ in 0..2 {
        let report = fx
            .ctx
            .delete_remote_files(&fx.graph_id, fx.root(), &["a.md"], TOKEN)
            .await
            .unwrap();
        assert_eq!(report.items[0].result, Ok(Applied::DeletedRemote));
    }
    assert!(fx.remote_version("a.md").is_none());
}

#[tokio::test]
async fn test_fetch_reports_missing_per_path() {
    let fx = fixture();
    fx.seed_remote("a.md", b"x", 1);

    let report = fx
        .ctx
        .fetch_remote_files(&fx.graph_id, fx.root(), &["a.md", "gone.md"], TOKEN)
        .await
        .unwrap();

    assert!(report.items[0].is_ok());
    assert_eq!(
        report.items[1].result,
        Err(SyncError::NotFound("gone.md".to_string()))
    );
    assert!(matches!(
        report.into_result(),
        Err(SyncError::PartialBatchFailure { failed: 1, total: 2 })
    ));
}

#[tokio::test]
async fn test_malformed_path_does_not_abort_upload_batch() {
    let fx = fixture();
    fx.write("a.md", b"a");

    let report = fx
        .ctx
        .update_remote_files(&fx.graph_id, fx.root(), &["/etc/passwd", "a.md"], TOKEN)
        .await
        .unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(report.items[0].path, "/etc/passwd");
    assert!(matches!(
        report.items[0].result,
        Err(SyncError::InvalidArgument(_))
    ));
    assert_eq!(report.items[1].result, Ok(Applied::Uploaded(RemoteVersion::new(1))));
}

#[tokio::test]
async fn test_update_local_downloads_only_remote_changes() {
    let fx = fixture();
    for (path, body) in [("pulled.md", "old"), ("edited.md", "old"), ("both.md", "old")] {
        fx.write(path, body.as_bytes());
    }
    fx.ctx
        .update_remote_files(
            &fx.graph_id,
            fx.root(),
            &["pulled.md", "edited.md", "both.md"],
            TOKEN,
        )
        .await
        .unwrap();

    // remote moves ahead on two paths, local edits two paths
    fx.seed_remote("pulled.md", b"remote new", 2);
    fx.seed_remote("both.md", b"remote new", 2);
    fx.write("edited.md", b"local new");
    fx.write("both.md", b"local new");
    fx.seed_remote("only-remote.md", b"fresh", 1);

    let report = fx
        .ctx
        .update_local_files(
            &fx.graph_id,
            fx.root(),
            &["pulled.md", "edited.md", "both.md", "only-remote.md", "nowhere.md"],
            TOKEN,
        )
        .await
        .unwrap();

    assert_eq!(report.items[0].result, Ok(Applied::Downloaded(RemoteVersion::new(2))));
    assert_eq!(fx.read("pulled.md").unwrap(), b"remote new");

    assert_eq!(report.items[1].result, Ok(Applied::Unchanged));
    assert_eq!(fx.read("edited.md").unwrap(), b"local new");

    assert_eq!(
        report.items[2].result,
        Err(SyncError::VersionConflict {
            path: "both.md".to_string(),
            expected: RemoteVersion::new(1),
            actual: RemoteVersion::new(2),
        })
    );
    assert_eq!(fx.read("both.md").unwrap(), b"local new");

    assert!(report.items[3].is_ok());
    assert_eq!(fx.read("only-remote.md").unwrap(), b"fresh");

    assert!(matches!(report.items[4].result, Err(SyncError::NotFound(_))));
}

#[tokio::test]
async fn test_update_local_version_files_records_ack_only() {
    let fx = fixture();
    fx.write("a.md", b"same");
    fx.seed_remote("a.md", b"same", 7);
    fx.write("local-only.md", b"x");

    let report = fx
        .ctx
        .update_local_version_files(&fx.graph_id, fx.root(), &["a.md", "local-only.md"], TOKEN)
        .await
        .unwrap();

    assert_eq!(report.items[0].result, Ok(RemoteVersion::new(7)));
    assert!(matches!(report.items[1].result, Err(SyncError::NotFound(_))));

    let meta = fx
        .ctx
        .get_local_files_meta(&fx.graph_id, fx.root(), &["a.md"])
        .await
        .unwrap();
    assert_eq!(meta[0].as_ref().unwrap().acked_version, Some(RemoteVersion::new(7)));

    // the ack makes the next update a plain CAS on version 7
    fx.write("a.md", b"edited");
    let report = fx
        .ctx
        .update_remote_files(&fx.graph_id, fx.root(), &["a.md"], TOKEN)
        .await
        .unwrap();
    assert_eq!(report.items[0].result, Ok(Applied::Uploaded(RemoteVersion::new(8))));
}

#[tokio::test]
async fn test_fetch_version_files_into_version_tree() {
    let fx = fixture();
    fx.seed_history("pages/a.md", "2024-01-01T00:00:00Z", b"yesterday");

    let report = fx
        .ctx
        .fetch_remote_version_files(
            &fx.graph_id,
            fx.root(),
            &[("pages/a.md".to_string(), "2024-01-01T00:00:00Z".to_string())],
            TOKEN,
        )
        .await
        .unwrap();

    let written = report.items[0].result.clone().unwrap();
    assert_eq!(
        written,
        rel("logseq/version-files/2024-01-01T00:00:00Z/pages/a.md")
    );
    assert_eq!(fx.read(written.as_str()).unwrap(), b"yesterday");
    assert!(fx.read("pages/a.md").is_none());
}

#[tokio::test]
async fn test_sync_graph_reconciles_both_directions() {
    let fx = fixture();
    fx.write("local.md", b"up");
    fx.seed_remote("remote.md", b"down", 3);
    fx.write("same.md", b"equal");
    fx.seed_remote("same.md", b"equal", 5);
    fx.write("clash.md", b"mine");
    fx.seed_remote("clash.md", b"theirs", 2);
    fx.remote.objects.lock().unwrap().insert(
        graphsync_core::domain::EncodedPath::new(format!("e.{}", "ab".repeat(40))).unwrap(),
        (vec![0; 4], RemoteVersion::new(1), graphsync_sync::digest_bytes(b"?")),
    );

    let summary = fx
        .ctx
        .sync_graph(&fx.graph_id, fx.root(), TOKEN)
        .await
        .unwrap();

    assert_eq!(summary.report.len(), 2);
    assert!(summary.report.failed().next().is_none());
    assert_eq!(fx.read("remote.md").unwrap(), b"down");
    assert_eq!(fx.remote_content("local.md").unwrap(), b"up");

    assert_eq!(summary.conflicts.len(), 1);
    assert_eq!(summary.conflicts[0].path, rel("clash.md"));
    assert_eq!(fx.read("clash.md").unwrap(), b"mine");
    assert_eq!(fx.remote_content("clash.md").unwrap(), b"theirs");
    assert_eq!(summary.undecodable.len(), 1);

    let meta = fx
        .ctx
        .get_local_files_meta(&fx.graph_id, fx.root(), &["same.md"])
        .await
        .unwrap();
    assert_eq!(meta[0].as_ref().unwrap().acked_version, Some(RemoteVersion::new(5)));
}

#[tokio::test]
async fn test_remote_calls_need_keys() {
    let fx = fixture();
    let other = graphsync_core::domain::GraphId::new().to_string();

    assert!(matches!(
        fx.ctx
            .fetch_remote_files(&other, fx.root(), &["a.md"], TOKEN)
            .await,
        Err(SyncError::InvalidArgument(_))
    ));
}
