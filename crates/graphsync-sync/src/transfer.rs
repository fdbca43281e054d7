//! Transfer coordinator
//!
//! Executes classified [`SyncOperation`]s against one graph:
//!
//! ```text
//! ops ──► JoinSet ──► permit (Semaphore) ──► path locks ──► apply
//!                         │                      │
//!                  cancel checked          cancel checked
//! ```
//!
//! - Concurrency is bounded by a semaphore shared by every batch in the
//!   process, so parallel callers cannot exceed the descriptor budget.
//! - Each operation holds the locks of every path it touches for its whole
//!   duration; distinct paths run fully in parallel.
//! - Names and content are encrypted on the way out and decrypted (then
//!   digest-verified) on the way in.
//! - Cancellation stops new operations from starting and aborts streams at
//!   their next check. Finished operations stay committed; an aborted
//!   download never replaces the existing file.
//! - The ack ledger is updated only after an operation fully succeeds.

use std::collections::HashMap;
use std::future::Future;
use std::slice;
use std::sync::Arc;

use graphsync_core::domain::{
    AckRecord, BatchReport, CanonicalPath, GraphId, OperationId, OperationKind, PathOutcome,
    RelativePath, RemoteVersion, SyncError, SyncOperation, TransferDirection,
};
use graphsync_core::ports::{
    IProgressReporter, IRemoteStore, RemoteContext, RemoteDescriptor, UploadRequest,
};
use graphsync_crypto::EncryptionContext;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::filesystem::{digest_bytes, LocalMetadataStore};
use crate::ledger::AckLedger;
use crate::locks::PathLocks;
use crate::progress::TransferProgress;

/// Everything an operation needs to know about its graph
#[derive(Clone)]
pub struct GraphSession {
    pub graph_id: GraphId,
    pub root: CanonicalPath,
    pub crypto: Arc<EncryptionContext>,
    pub ledger: Arc<AckLedger>,
    pub remote: RemoteContext,
}

impl GraphSession {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.remote.cancel
    }
}

/// What a successful operation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Uploaded(RemoteVersion),
    Downloaded(RemoteVersion),
    DeletedLocal,
    DeletedRemote,
    Renamed(RemoteVersion),
    /// Nothing needed doing
    Unchanged,
}

impl Applied {
    /// The remote version the operation left behind, if it produced one
    #[must_use]
    pub fn version(&self) -> Option<RemoteVersion> {
        match self {
            Applied::Uploaded(v) | Applied::Downloaded(v) | Applied::Renamed(v) => Some(*v),
            _ => None,
        }
    }
}

/// Bounded, cancellable executor for sync operations
#[derive(Clone)]
pub struct TransferCoordinator {
    remote: Arc<dyn IRemoteStore>,
    store: LocalMetadataStore,
    locks: PathLocks,
    progress: Arc<dyn IProgressReporter>,
    permits: Arc<Semaphore>,
}

impl TransferCoordinator {
    pub fn new(
        remote: Arc<dyn IRemoteStore>,
        store: LocalMetadataStore,
        progress: Arc<dyn IProgressReporter>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            remote,
            store,
            locks: PathLocks::new(),
            progress,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Same coordinator talking to a different remote
    ///
    /// Locks and permits stay shared, so in-flight transfers on the old
    /// remote keep their guarantees against transfers on the new one.
    #[must_use]
    pub fn with_remote(&self, remote: Arc<dyn IRemoteStore>) -> Self {
        Self {
            remote,
            ..self.clone()
        }
    }

    pub fn store(&self) -> &LocalMetadataStore {
        &self.store
    }

    pub fn remote(&self) -> &Arc<dyn IRemoteStore> {
        &self.remote
    }

    // ========================================================================
    // Batch execution
    // ========================================================================

    /// Run every operation, reporting one outcome per operation in input order
    #[instrument(skip(self, session, ops), fields(graph_id = %session.graph_id, count = ops.len()))]
    pub async fn execute(&self, session: &GraphSession, ops: Vec<SyncOperation>) -> BatchReport<Applied> {
        let paths: Vec<RelativePath> = ops.iter().map(|op| op.path().clone()).collect();
        let descriptors = Arc::new(self.prefetch_descriptors(session, &ops).await);

        let this = self.clone();
        let task_session = session.clone();
        let results = self
            .run_bounded(session.cancel_token(), ops, move |op| {
                let this = this.clone();
                let session = task_session.clone();
                let descriptors = descriptors.clone();
                async move { this.apply(&session, op, &descriptors).await }
            })
            .await;

        let report: BatchReport<Applied> = paths
            .into_iter()
            .zip(results)
            .map(|(path, result)| PathOutcome {
                result: result.map_err(|e| at_path(e, &path)),
                path,
            })
            .collect();

        for failed in report.failed() {
            if let Err(e) = &failed.result {
                warn!(path = %failed.path, error = %e, "Operation failed");
            }
        }
        info!(%report, "Batch finished");
        report
    }

    /// Download historical versions into `<version_dir>/<version id>/<path>`
    ///
    /// Reports the relative path each version was written to.
    #[instrument(skip(self, session, items), fields(graph_id = %session.graph_id, count = items.len()))]
    pub async fn fetch_version_files(
        &self,
        session: &GraphSession,
        items: Vec<(RelativePath, String)>,
        version_dir: &RelativePath,
    ) -> BatchReport<RelativePath> {
        let paths: Vec<RelativePath> = items.iter().map(|(p, _)| p.clone()).collect();
        let this = self.clone();
        let task_session = session.clone();
        let version_dir = version_dir.clone();

        let results = self
            .run_bounded(session.cancel_token(), items, move |(path, version_id)| {
                let this = this.clone();
                let session = task_session.clone();
                let version_dir = version_dir.clone();
                async move {
                    this.fetch_version(&session, &path, &version_id, &version_dir)
                        .await
                }
            })
            .await;

        let report: BatchReport<RelativePath> = paths
            .into_iter()
            .zip(results)
            .map(|(path, result)| PathOutcome {
                result: result.map_err(|e| at_path(e, &path)),
                path,
            })
            .collect();
        info!(%report, "Fetched version files");
        report
    }

    // ========================================================================
    // Local-only mutations (share the path locks with transfers)
    // ========================================================================

    /// Rename a local file and carry its ack along
    ///
    /// # Errors
    /// See [`LocalMetadataStore::rename`]
    pub async fn rename_local(
        &self,
        root: &CanonicalPath,
        ledger: &AckLedger,
        from: &RelativePath,
        to: &RelativePath,
    ) -> Result<(), SyncError> {
        let _guard = self.locks.lock_all(&[from, to]).await;
        self.store.rename(root, from, to).await?;
        ledger.rename(from, to);
        Ok(())
    }

    /// Delete local files, best-effort per path
    pub async fn delete_local(
        &self,
        root: &CanonicalPath,
        ledger: &AckLedger,
        paths: &[RelativePath],
    ) -> BatchReport<()> {
        let refs: Vec<&RelativePath> = paths.iter().collect();
        let _guard = self.locks.lock_all(&refs).await;
        let report = self.store.delete(root, paths).await;
        for item in report.succeeded() {
            ledger.forget(&item.path);
        }
        report
    }

    // ========================================================================
    // Worker pool
    // ========================================================================

    /// Run `f` over `items` with at most `permits` in flight
    ///
    /// Items still waiting for a permit when `cancel` fires never start and
    /// report `Cancelled`.
    async fn run_bounded<I, F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        items: Vec<I>,
        f: F,
    ) -> Vec<Result<T, SyncError>>
    where
        I: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
        T: Send + 'static,
    {
        let total = items.len();
        let f = Arc::new(f);
        let mut set = JoinSet::new();

        for (idx, item) in items.into_iter().enumerate() {
            let permits = self.permits.clone();
            let cancel = cancel.clone();
            let f = f.clone();
            set.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = permits.acquire_owned() => permit.ok(),
                };
                let result = match permit {
                    Some(_permit) if !cancel.is_cancelled() => f(item).await,
                    _ => Err(SyncError::Cancelled),
                };
                (idx, result)
            });
        }

        let mut results: Vec<Option<Result<T, SyncError>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => warn!(error = %e, "Transfer task did not complete"),
            }
        }
        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(SyncError::Io("transfer task aborted".to_string()))))
            .collect()
    }

    // ========================================================================
    // Single operations
    // ========================================================================

    async fn apply(
        &self,
        session: &GraphSession,
        op: SyncOperation,
        descriptors: &HashMap<RelativePath, Result<RemoteDescriptor, SyncError>>,
    ) -> Result<Applied, SyncError> {
        let cancel = session.cancel_token();
        let touched = op.touched_paths();
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            guard = self.locks.lock_all(&touched) => guard,
        };
        debug!(operation = %op, "Applying");

        match &op.kind {
            OperationKind::Upload {
                path,
                expected_version,
            } => self
                .upload(session, op.id, path, *expected_version)
                .await
                .map(Applied::Uploaded),
            OperationKind::Download { path, .. } => {
                let descriptor = descriptors
                    .get(path)
                    .cloned()
                    .unwrap_or_else(|| Err(SyncError::NotFound(path.to_string())))?;
                self.download(session, op.id, path, &descriptor)
                    .await
                    .map(Applied::Downloaded)
            }
            OperationKind::DeleteLocal { path } => {
                let mut report = self.store.delete(&session.root, slice::from_ref(path)).await;
                match report.items.pop() {
                    Some(PathOutcome { result: Err(e), .. }) => Err(e),
                    _ => {
                        session.ledger.forget(path);
                        Ok(Applied::DeletedLocal)
                    }
                }
            }
            OperationKind::DeleteRemote { path } => self
                .delete_remote(session, path)
                .await
                .map(|()| Applied::DeletedRemote),
            OperationKind::Rename { from, to } => {
                let expected = session
                    .ledger
                    .get(to)
                    .map_or(RemoteVersion::ABSENT, |ack| ack.version);
                let version = self.upload(session, op.id, to, Some(expected)).await?;
                self.delete_remote(session, from).await?;
                Ok(Applied::Renamed(version))
            }
        }
    }

    async fn upload(
        &self,
        session: &GraphSession,
        operation_id: OperationId,
        path: &RelativePath,
        expected_version: Option<RemoteVersion>,
    ) -> Result<RemoteVersion, SyncError> {
        let data = self.store.read(&session.root, path).await?;
        let digest = digest_bytes(&data);
        let encoded_path = session.crypto.encode_path(path)?;
        let body = session.crypto.seal_content(&data)?;
        session.remote.check_cancelled()?;

        let progress = TransferProgress::new(
            self.progress.clone(),
            session.graph_id,
            operation_id,
            path.clone(),
            TransferDirection::Upload,
        );
        let version = self
            .remote
            .upload(
                &session.remote,
                UploadRequest {
                    encoded_path,
                    body,
                    checksum: digest.clone(),
                    expected_version,
                },
                progress.byte_progress(),
            )
            .await?;

        session
            .ledger
            .record(path.clone(), AckRecord::new(version, digest));
        info!(path = %path, version = %version, "Uploaded");
        Ok(version)
    }

    async fn download(
        &self,
        session: &GraphSession,
        operation_id: OperationId,
        path: &RelativePath,
        descriptor: &RemoteDescriptor,
    ) -> Result<RemoteVersion, SyncError> {
        let plaintext = self
            .download_verified(session, operation_id, path, descriptor)
            .await?;

        // last point at which cancelling leaves the existing file untouched
        session.remote.check_cancelled()?;
        self.store
            .write_atomic(&session.root, path, &plaintext)
            .await?;

        session.ledger.record(
            path.clone(),
            AckRecord::new(descriptor.version, descriptor.checksum.clone()),
        );
        info!(path = %path, version = %descriptor.version, "Downloaded");
        Ok(descriptor.version)
    }

    /// Stream, decrypt and check the digest of one remote body
    async fn download_verified(
        &self,
        session: &GraphSession,
        operation_id: OperationId,
        path: &RelativePath,
        descriptor: &RemoteDescriptor,
    ) -> Result<Vec<u8>, SyncError> {
        session.remote.check_cancelled()?;
        let progress = TransferProgress::new(
            self.progress.clone(),
            session.graph_id,
            operation_id,
            path.clone(),
            TransferDirection::Download,
        );
        let body = self
            .remote
            .download(&session.remote, descriptor, progress.byte_progress())
            .await?;

        let plaintext = session.crypto.open_content(&body)?;
        let digest = digest_bytes(&plaintext);
        if digest != descriptor.checksum {
            return Err(SyncError::IntegrityMismatch {
                path: path.to_string(),
                expected: descriptor.checksum.to_string(),
                actual: digest.to_string(),
            });
        }
        Ok(plaintext)
    }

    async fn delete_remote(&self, session: &GraphSession, path: &RelativePath) -> Result<(), SyncError> {
        let encoded = session.crypto.encode_path(path)?;
        let mut results = self
            .remote
            .delete_files(&session.remote, slice::from_ref(&encoded))
            .await?;
        results.remove(&encoded).unwrap_or(Ok(()))?;
        session.ledger.forget(path);
        info!(path = %path, "Deleted remote file");
        Ok(())
    }

    async fn fetch_version(
        &self,
        session: &GraphSession,
        path: &RelativePath,
        version_id: &str,
        version_dir: &RelativePath,
    ) -> Result<RelativePath, SyncError> {
        if version_id.is_empty() || version_id.contains('/') {
            return Err(SyncError::InvalidArgument(format!(
                "invalid version id '{version_id}'"
            )));
        }
        let target = RelativePath::new(format!("{version_dir}/{version_id}/{path}"))?;
        let encoded = session.crypto.encode_path(path)?;

        let descriptor = self
            .remote
            .get_version_files(&session.remote, &[(encoded.clone(), version_id.to_string())])
            .await?
            .remove(&encoded)
            .ok_or_else(|| SyncError::NotFound(format!("{path}@{version_id}")))?;

        let plaintext = self
            .download_verified(session, OperationId::new(), path, &descriptor)
            .await?;

        let _guard = self.locks.lock(&target).await;
        session.remote.check_cancelled()?;
        self.store
            .write_atomic(&session.root, &target, &plaintext)
            .await?;
        debug!(path = %path, version_id, target = %target, "Stored version file");
        Ok(target)
    }

    /// One `get_files` call for every download in the batch
    async fn prefetch_descriptors(
        &self,
        session: &GraphSession,
        ops: &[SyncOperation],
    ) -> HashMap<RelativePath, Result<RemoteDescriptor, SyncError>> {
        let mut out = HashMap::new();
        let mut wanted = HashMap::new();
        for op in ops {
            if let OperationKind::Download { path, .. } = &op.kind {
                match session.crypto.encode_path(path) {
                    Ok(encoded) => {
                        wanted.insert(encoded, path.clone());
                    }
                    Err(e) => {
                        out.insert(path.clone(), Err(e.into()));
                    }
                }
            }
        }
        if wanted.is_empty() {
            return out;
        }

        let keys: Vec<_> = wanted.keys().cloned().collect();
        match self.remote.get_files(&session.remote, &keys).await {
            Ok(mut found) => {
                for (encoded, path) in wanted {
                    let result = found
                        .remove(&encoded)
                        .ok_or_else(|| SyncError::NotFound(path.to_string()));
                    out.insert(path, result);
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not resolve download descriptors");
                for path in wanted.into_values() {
                    out.insert(path, Err(e.clone()));
                }
            }
        }
        out
    }
}

/// Report remote failures against the plain path instead of the encrypted key
fn at_path(err: SyncError, path: &RelativePath) -> SyncError {
    match err {
        SyncError::VersionConflict {
            expected, actual, ..
        } => SyncError::VersionConflict {
            path: path.to_string(),
            expected,
            actual,
        },
        SyncError::NotFound(_) => SyncError::NotFound(path.to_string()),
        other => other,
    }
}
