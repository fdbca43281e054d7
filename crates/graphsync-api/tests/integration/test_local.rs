//! Local metadata, rename and delete through the context

use graphsync_core::domain::{GraphId, RemoteVersion, SyncError};
use graphsync_sync::digest_bytes;

use crate::common::{fixture, TOKEN};

#[tokio::test]
async fn test_meta_keeps_index_of_missing_file() {
    let fx = fixture();
    fx.write("pages/a.md", b"alpha");
    fx.write("pages/c.md", b"gamma");

    let meta = fx
        .ctx
        .get_local_files_meta(&fx.graph_id, fx.root(), &["pages/a.md", "pages/b.md", "pages/c.md"])
        .await
        .unwrap();

    assert_eq!(meta.len(), 3);
    assert_eq!(meta[0].as_ref().unwrap().digest, digest_bytes(b"alpha"));
    assert!(meta[1].is_none());
    assert_eq!(meta[2].as_ref().unwrap().size, 5);
}

#[tokio::test]
async fn test_all_meta_skips_hidden_and_backup_trees() {
    let fx = fixture();
    fx.write("pages/a.md", b"a");
    fx.write("journals/2024_01_01.md", b"j");
    fx.write(".git/config", b"x");
    fx.write("pages/.hidden.md", b"x");
    fx.write("logseq/bak/pages/a.md", b"x");
    fx.write("logseq/version-files/v1/pages/a.md", b"x");

    let mut paths: Vec<String> = fx
        .ctx
        .get_local_all_files_meta(&fx.graph_id, fx.root())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.path.to_string())
        .collect();
    paths.sort();

    assert_eq!(paths, ["journals/2024_01_01.md", "pages/a.md"]);
}

#[tokio::test]
async fn test_meta_reports_acked_version_after_upload() {
    let fx = fixture();
    fx.write("a.md", b"x");
    fx.ctx
        .update_remote_files(&fx.graph_id, fx.root(), &["a.md"], TOKEN)
        .await
        .unwrap();

    let meta = fx
        .ctx
        .get_local_files_meta(&fx.graph_id, fx.root(), &["a.md"])
        .await
        .unwrap();
    assert_eq!(meta[0].as_ref().unwrap().acked_version, Some(RemoteVersion::new(1)));
}

#[tokio::test]
async fn test_rename_moves_file_and_ack() {
    let fx = fixture();
    fx.write("pages/old.md", b"x");
    fx.ctx
        .update_remote_files(&fx.graph_id, fx.root(), &["pages/old.md"], TOKEN)
        .await
        .unwrap();

    fx.ctx
        .rename_local_file(&fx.graph_id, fx.root(), "pages/old.md", "pages/new.md")
        .await
        .unwrap();

    assert!(fx.read("pages/old.md").is_none());
    let meta = fx
        .ctx
        .get_local_files_meta(&fx.graph_id, fx.root(), &["pages/new.md"])
        .await
        .unwrap();
    assert_eq!(meta[0].as_ref().unwrap().acked_version, Some(RemoteVersion::new(1)));
}

#[tokio::test]
async fn test_rename_refuses_to_clobber() {
    let fx = fixture();
    fx.write("a.md", b"a");
    fx.write("b.md", b"b");

    let err = fx
        .ctx
        .rename_local_file(&fx.graph_id, fx.root(), "a.md", "b.md")
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidArgument(_)));
    assert_eq!(fx.read("b.md").unwrap(), b"b");
}

#[tokio::test]
async fn test_delete_local_is_per_path() {
    let fx = fixture();
    fx.write("a.md", b"a");
    std::fs::create_dir_all(fx.file("dir.md")).unwrap();

    let report = fx
        .ctx
        .delete_local_files(&fx.graph_id, fx.root(), &["a.md", "missing.md", "dir.md"])
        .await
        .unwrap();

    assert!(report.items[0].is_ok());
    assert!(report.items[1].is_ok());
    assert!(matches!(
        report.items[2].result,
        Err(SyncError::InvalidArgument(_))
    ));
    assert!(fx.read("a.md").is_none());
}

#[tokio::test]
async fn test_malformed_paths_fail_only_their_slot() {
    let fx = fixture();
    fx.write("a.md", b"a");
    fx.write("b.md", b"b");

    let meta = fx
        .ctx
        .get_local_files_meta(&fx.graph_id, fx.root(), &["a.md", "../outside.md", "", "b.md"])
        .await
        .unwrap();
    assert_eq!(meta.len(), 4);
    assert_eq!(meta[0].as_ref().unwrap().size, 1);
    assert!(meta[1].is_none() && meta[2].is_none());
    assert_eq!(meta[3].as_ref().unwrap().path.as_str(), "b.md");

    let report = fx
        .ctx
        .delete_local_files(&fx.graph_id, fx.root(), &["../b.md", "a.md"])
        .await
        .unwrap();
    assert_eq!(report.items[0].path, "../b.md");
    assert!(matches!(
        report.items[0].result,
        Err(SyncError::InvalidArgument(_))
    ));
    assert!(report.items[1].is_ok());
    assert!(fx.read("a.md").is_none());
    assert_eq!(fx.read("b.md").unwrap(), b"b");
}

#[tokio::test]
async fn test_call_setup_errors_fail_whole_call() {
    let fx = fixture();

    assert!(matches!(
        fx.ctx.get_local_all_files_meta("nope", fx.root()).await,
        Err(SyncError::InvalidArgument(_))
    ));
    assert!(matches!(
        fx.ctx
            .get_local_all_files_meta(&fx.graph_id, &fx.file("no-such-dir"))
            .await,
        Err(SyncError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_graph_is_bound_to_first_root() {
    let fx = fixture();
    let other = tempfile::TempDir::new().unwrap();

    fx.ctx
        .get_local_all_files_meta(&fx.graph_id, fx.root())
        .await
        .unwrap();
    assert!(matches!(
        fx.ctx.get_local_all_files_meta(&fx.graph_id, other.path()).await,
        Err(SyncError::InvalidArgument(_))
    ));

    // a different graph may use it
    let second = GraphId::new().to_string();
    assert!(fx.ctx.get_local_all_files_meta(&second, other.path()).await.is_ok());
}

#[test]
fn test_canonicalize_path() {
    let fx = fixture();
    fx.write("pages/a.md", b"a");

    let messy = fx.root().join("pages").join("..").join("pages").join("a.md");
    let canonical = fx.ctx.canonicalize_path(&messy).unwrap();
    assert_eq!(
        canonical,
        fx.ctx.canonicalize_path(fx.file("pages/a.md")).unwrap()
    );
    assert!(canonical.as_path().is_absolute());
    assert!(matches!(
        fx.ctx.canonicalize_path(fx.file("missing")),
        Err(SyncError::NotFound(_))
    ));
}
