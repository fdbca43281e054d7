//! Remote store port (driven/secondary port)
//!
//! The sync engine talks to the backend only through [`IRemoteStore`].
//! Everything crossing this boundary is already encrypted: keys are
//! [`EncodedPath`]s and bodies are ciphertext envelopes.
//!
//! ## Design Notes
//!
//! - Methods return `SyncError` rather than `anyhow::Result` because the
//!   coordinator branches on the failure class (`VersionConflict`,
//!   `NotFound`, `NetworkTransient`, `Cancelled`).
//! - Every call carries a [`RemoteContext`]: the bearer token lives only as
//!   long as the operation that uses it, and the cancellation token lets
//!   in-flight streams stop at their next check.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::{
    AuthToken, ContentDigest, EncodedPath, GraphId, RemoteFileRecord, RemoteVersion, SyncError,
};

/// Callback receiving `(bytes_done, bytes_total)` during a stream
pub type ByteProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// A progress callback that ignores every update
pub fn ignore_progress() -> ByteProgress {
    Arc::new(|_, _| {})
}

/// Per-operation call context
#[derive(Debug, Clone)]
pub struct RemoteContext {
    pub graph_id: GraphId,
    pub token: AuthToken,
    pub cancel: CancellationToken,
}

impl RemoteContext {
    pub fn new(graph_id: GraphId, token: AuthToken, cancel: CancellationToken) -> Self {
        Self {
            graph_id,
            token,
            cancel,
        }
    }

    /// Fails with `Cancelled` once the token has been raised
    ///
    /// # Errors
    /// Returns `SyncError::Cancelled`
    pub fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Where and what to download for one remote file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    pub encoded_path: EncodedPath,
    pub url: String,
    pub size: u64,
    pub version: RemoteVersion,
    pub checksum: ContentDigest,
    pub last_modified: Option<DateTime<Utc>>,
}

impl RemoteDescriptor {
    pub fn record(&self) -> RemoteFileRecord {
        RemoteFileRecord {
            encoded_path: self.encoded_path.clone(),
            size: self.size,
            version: self.version,
            checksum: self.checksum.clone(),
            last_modified: self.last_modified,
        }
    }
}

/// One encrypted write
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub encoded_path: EncodedPath,
    pub body: Vec<u8>,
    /// Digest of the plaintext
    pub checksum: ContentDigest,
    /// Compare-and-swap precondition; `Some(RemoteVersion::ABSENT)` means create-only
    pub expected_version: Option<RemoteVersion>,
}

/// Backend operations on encrypted files
#[async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Full listing of the graph
    async fn list_files(&self, ctx: &RemoteContext) -> Result<Vec<RemoteFileRecord>, SyncError>;

    /// Download descriptors for the given keys; absent keys are omitted
    async fn get_files(
        &self,
        ctx: &RemoteContext,
        keys: &[EncodedPath],
    ) -> Result<HashMap<EncodedPath, RemoteDescriptor>, SyncError>;

    /// Download descriptors for historical versions, keyed by `(path, version id)`
    async fn get_version_files(
        &self,
        ctx: &RemoteContext,
        keys: &[(EncodedPath, String)],
    ) -> Result<HashMap<EncodedPath, RemoteDescriptor>, SyncError>;

    /// Stream a file body
    async fn download(
        &self,
        ctx: &RemoteContext,
        descriptor: &RemoteDescriptor,
        progress: ByteProgress,
    ) -> Result<Vec<u8>, SyncError>;

    /// Store a body and commit it under `encoded_path`, returning the new version
    ///
    /// Fails with `SyncError::VersionConflict` when the precondition does not hold.
    async fn upload(
        &self,
        ctx: &RemoteContext,
        request: UploadRequest,
        progress: ByteProgress,
    ) -> Result<RemoteVersion, SyncError>;

    /// Delete files; already-absent files count as deleted
    async fn delete_files(
        &self,
        ctx: &RemoteContext,
        keys: &[EncodedPath],
    ) -> Result<HashMap<EncodedPath, Result<(), SyncError>>, SyncError>;
}
