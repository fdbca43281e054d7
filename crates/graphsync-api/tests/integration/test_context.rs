//! Ambient settings: proxy, environment, cancellation, progress, passphrases

use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Duration;

use graphsync_api::{keygen, Applied};
use graphsync_core::config::Environment;
use graphsync_core::domain::{CryptoError, ProgressEvent, RemoteVersion, SyncError, TransferDirection};

use crate::common::{fixture, rel, TOKEN};

#[test]
fn test_set_proxy_applies_to_new_remote() {
    let fx = fixture();
    let before = fx.builds.lock().unwrap().len();

    fx.ctx.set_proxy(Some("https://proxy.example.com:3128")).unwrap();
    assert_eq!(fx.ctx.proxy().as_deref(), Some("https://proxy.example.com:3128"));

    fx.ctx.set_proxy(Some("")).unwrap();
    assert_eq!(fx.ctx.proxy(), None);

    let builds = fx.builds.lock().unwrap();
    assert_eq!(builds.len(), before + 2);
    assert_eq!(
        builds[before],
        (Environment::Dev, Some("https://proxy.example.com:3128".to_string()))
    );
    assert_eq!(builds[before + 1], (Environment::Dev, None));
}

#[test]
fn test_invalid_proxy_keeps_previous_setting() {
    let fx = fixture();
    fx.ctx.set_proxy(Some("https://proxy.example.com:3128")).unwrap();

    assert!(matches!(
        fx.ctx.set_proxy(Some("http://[invalid")),
        Err(SyncError::InvalidArgument(_))
    ));
    assert_eq!(fx.ctx.proxy().as_deref(), Some("https://proxy.example.com:3128"));
}

#[test]
fn test_set_env_validation() {
    let fx = fixture();
    assert_eq!(fx.ctx.environment(), Environment::Dev);

    assert!(matches!(
        fx.ctx
            .set_env(&fx.graph_id, "staging", &fx.keys.secret_key, &fx.keys.public_key),
        Err(SyncError::InvalidArgument(_))
    ));

    let other = keygen().unwrap();
    assert!(matches!(
        fx.ctx
            .set_env(&fx.graph_id, "prod", &fx.keys.secret_key, &other.public_key),
        Err(SyncError::Crypto(CryptoError::InvalidKey(_)))
    ));
    assert_eq!(fx.ctx.environment(), Environment::Dev);

    fx.ctx
        .set_env(&fx.graph_id, "production", &fx.keys.secret_key, &fx.keys.public_key)
        .unwrap();
    assert_eq!(fx.ctx.environment(), Environment::Prod);
    assert_eq!(fx.builds.lock().unwrap().last().unwrap().0, Environment::Prod);
}

#[tokio::test]
async fn test_requests_after_cancel_run_normally() {
    let fx = fixture();
    fx.write("a.md", b"x");

    fx.ctx.cancel_all_requests();
    let report = fx
        .ctx
        .update_remote_files(&fx.graph_id, fx.root(), &["a.md"], TOKEN)
        .await
        .unwrap();

    assert_eq!(report.items[0].result, Ok(Applied::Uploaded(RemoteVersion::new(1))));
}

#[tokio::test]
async fn test_progress_reaches_registered_callback() {
    let fx = fixture();
    fx.write("pages/a.md", &vec![b'x'; 4096]);

    let (tx, rx) = mpsc::channel::<ProgressEvent>();
    let tx = Mutex::new(tx);
    fx.ctx.set_progress_callback(Some(std::sync::Arc::new(move |event| {
        let _ = tx.lock().unwrap().send(event);
    })));

    fx.ctx
        .update_remote_files(&fx.graph_id, fx.root(), &["pages/a.md"], TOKEN)
        .await
        .unwrap();

    let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.graph_id.to_string(), fx.graph_id);
    assert_eq!(event.file, rel("pages/a.md"));
    assert_eq!(event.direction, TransferDirection::Upload);
    assert!(event.is_complete());

    fx.ctx.set_progress_callback(None);
}

#[test]
fn test_passphrase_envelope_distinguishes_failures() {
    let fx = fixture();
    let envelope = fx.ctx.encrypt_with_passphrase("correct horse", b"secret key text").unwrap();

    assert_eq!(
        fx.ctx.decrypt_with_passphrase("correct horse", &envelope).unwrap(),
        b"secret key text"
    );
    assert_eq!(
        fx.ctx.decrypt_with_passphrase("battery staple", &envelope),
        Err(SyncError::Crypto(CryptoError::WrongPassphrase))
    );

    let mut damaged = envelope.clone();
    let last = damaged.len() - 1;
    damaged[last] ^= 0x01;
    assert!(matches!(
        fx.ctx.decrypt_with_passphrase("correct horse", &damaged),
        Err(SyncError::Crypto(CryptoError::CorruptData(_)))
    ));
}

#[test]
fn test_global_context_initializes_once() {
    let first = graphsync_api::init_global(Default::default()).unwrap();
    let second = graphsync_api::init_global(Default::default()).unwrap();
    assert!(std::ptr::eq(first, second));
    assert!(graphsync_api::global().is_some());
}
