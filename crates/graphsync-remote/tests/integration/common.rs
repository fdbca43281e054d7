//! Shared test helpers for backend integration tests
//!
//! Each helper mounts the endpoints a test needs and returns a client
//! pointing at the mock server with a fast retry policy.

use std::time::Duration;

use graphsync_core::domain::{AuthToken, ContentDigest, EncodedPath, GraphId};
use graphsync_remote::{RemoteClient, RetryPolicy};
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

pub const GRAPH: &str = "6f1c2c5e-8a8d-4e7b-9a53-2d1b1f0c3a11";
pub const TOKEN: &str = "test-access-token";

/// Starts a mock server and returns a (MockServer, RemoteClient) tuple.
pub async fn setup_mock() -> (MockServer, RemoteClient) {
    let server = MockServer::start().await;
    let client = RemoteClient::with_base_url(server.uri()).with_retry_policy(RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    });
    (server, client)
}

pub fn graph_id() -> GraphId {
    GRAPH.parse().unwrap()
}

pub fn token() -> AuthToken {
    AuthToken::new(TOKEN)
}

pub fn cancel() -> CancellationToken {
    CancellationToken::new()
}

/// A syntactically valid encrypted key; `n` varies the body
pub fn key(n: u8) -> EncodedPath {
    EncodedPath::new(format!("e.{}", format!("{n:02x}").repeat(32))).unwrap()
}

pub fn digest(n: u8) -> ContentDigest {
    ContentDigest::from_bytes(&[n; 32])
}
