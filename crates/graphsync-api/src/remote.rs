//! Operations that talk to the remote store

use std::collections::HashMap;
use std::path::Path;

use graphsync_core::domain::{
    AckRecord, BatchReport, Conflict, EncodedPath, OperationKind, PathOutcome, RelativePath,
    RemoteFileRecord, RemoteVersion, SyncError, SyncOperation,
};
use graphsync_sync::{index_remote, Applied, GraphSession, SyncDiffEngine, TransferCoordinator};
use tracing::{debug, info, instrument, warn};

use crate::context::{RequestedPaths, SyncContext};

/// Result of a full graph reconciliation
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub report: BatchReport<Applied>,
    /// Paths changed on both sides; left untouched
    pub conflicts: Vec<Conflict>,
    /// Remote names that did not decrypt under the graph's key
    pub undecodable: Vec<EncodedPath>,
}

impl SyncContext {
    /// Download and decrypt the listed paths, overwriting local copies
    ///
    /// # Errors
    /// Call-setup failures only; per-path failures, malformed paths
    /// included, are in the report
    #[instrument(skip(self, root, paths, token), fields(count = paths.len()))]
    pub async fn fetch_remote_files<S: AsRef<str>>(
        &self,
        graph_id: &str,
        root: &Path,
        paths: &[S],
        token: &str,
    ) -> Result<BatchReport<Applied, String>, SyncError> {
        let session = self.session(graph_id, root, token)?;
        let requested = RequestedPaths::parse(paths);
        let ops = requested
            .valid()
            .into_iter()
            .map(|p| SyncOperation::download(p, None))
            .collect();
        let report = self.coordinator().execute(&session, ops).await;
        Ok(requested.report(report))
    }

    /// Bring the listed paths up to date from the remote side
    ///
    /// Only paths whose remote copy moved ahead of the last ack are
    /// downloaded. Paths where only the local side changed are left alone
    /// and reported as `Unchanged`; paths changed on both sides are
    /// reported as `VersionConflict` and never overwritten.
    ///
    /// # Errors
    /// Call-setup failures, or a failure to read the remote metadata at all
    #[instrument(skip(self, root, paths, token), fields(count = paths.len()))]
    pub async fn update_local_files<S: AsRef<str>>(
        &self,
        graph_id: &str,
        root: &Path,
        paths: &[S],
        token: &str,
    ) -> Result<BatchReport<Applied, String>, SyncError> {
        let session = self.session(graph_id, root, token)?;
        let requested = RequestedPaths::parse(paths);
        let paths = requested.valid();
        let coordinator = self.coordinator();

        let local: HashMap<_, _> = coordinator
            .store()
            .scan_one(&session.root, &paths)
            .await?
            .into_iter()
            .flatten()
            .map(|record| (record.path.clone(), record))
            .collect();
        let remote = remote_snapshot(&coordinator, &session, &paths).await?;
        let acks = session.ledger.snapshot();
        let plan = SyncDiffEngine::classify_paths(paths.iter(), &local, &remote, &acks);

        let mut results: HashMap<RelativePath, Result<Applied, SyncError>> = HashMap::new();
        for path in plan.unchanged {
            results.insert(path, Ok(Applied::Unchanged));
        }
        for (path, ack) in plan.converged {
            session.ledger.record(path.clone(), ack);
            results.insert(path, Ok(Applied::Unchanged));
        }
        for conflict in plan.conflicts {
            let expected = conflict
                .acked
                .as_ref()
                .map_or(RemoteVersion::ABSENT, |ack| ack.version);
            results.insert(
                conflict.path.clone(),
                Err(SyncError::VersionConflict {
                    path: conflict.path.to_string(),
                    expected,
                    actual: conflict.remote_version,
                }),
            );
        }

        let mut downloads = Vec::new();
        for op in plan.operations {
            match &op.kind {
                OperationKind::Download { .. } => downloads.push(op),
                _ => {
                    debug!(path = %op.path(), "Local copy is newer, not downloading");
                    results.insert(op.path().clone(), Ok(Applied::Unchanged));
                }
            }
        }
        for outcome in coordinator.execute(&session, downloads).await.items {
            results.insert(outcome.path, outcome.result);
        }

        Ok(requested.report(in_request_order(paths, results)))
    }

    /// Record the current remote version of each path as acknowledged
    ///
    /// No content is transferred; the ack pairs the remote version with the
    /// digest of the local file.
    ///
    /// # Errors
    /// Call-setup failures, or a failure to read the remote metadata at all
    #[instrument(skip(self, root, paths, token), fields(count = paths.len()))]
    pub async fn update_local_version_files<S: AsRef<str>>(
        &self,
        graph_id: &str,
        root: &Path,
        paths: &[S],
        token: &str,
    ) -> Result<BatchReport<RemoteVersion, String>, SyncError> {
        let session = self.session(graph_id, root, token)?;
        let requested = RequestedPaths::parse(paths);
        let paths = requested.valid();
        let coordinator = self.coordinator();

        let local = coordinator.store().scan_one(&session.root, &paths).await?;
        let remote = remote_snapshot(&coordinator, &session, &paths).await?;

        let report: BatchReport<RemoteVersion> = paths
            .into_iter()
            .zip(local)
            .map(|(path, local)| {
                let result = match (local, remote.get(&path)) {
                    (Some(local), Some(remote)) => {
                        session.ledger.record(
                            path.clone(),
                            AckRecord::new(remote.version, local.digest),
                        );
                        Ok(remote.version)
                    }
                    (None, _) => Err(SyncError::NotFound(format!("{path} (local)"))),
                    (_, None) => Err(SyncError::NotFound(format!("{path} (remote)"))),
                };
                PathOutcome { path, result }
            })
            .collect();
        Ok(requested.report(report))
    }

    /// Download historical versions into the configured version-files tree
    ///
    /// Each item is `(path, version id)`; the report gives the relative path
    /// each version was written to.
    ///
    /// # Errors
    /// Call-setup failures only; a malformed path fails its own item
    #[instrument(skip(self, root, items, token), fields(count = items.len()))]
    pub async fn fetch_remote_version_files(
        &self,
        graph_id: &str,
        root: &Path,
        items: &[(String, String)],
        token: &str,
    ) -> Result<BatchReport<RelativePath, String>, SyncError> {
        let session = self.session(graph_id, root, token)?;
        let version_dir = RelativePath::new(&self.config.sync.version_files_dir)?;
        let requested =
            RequestedPaths::parse(&items.iter().map(|(path, _)| path).collect::<Vec<_>>());
        let valid = requested
            .valid_indexed()
            .map(|(i, path)| (path.clone(), items[i].1.clone()))
            .collect();

        let report = self
            .coordinator()
            .fetch_version_files(&session, valid, &version_dir)
            .await;
        Ok(requested.report(report))
    }

    /// Upload the listed paths, each guarded by its last acknowledged version
    ///
    /// Never-synced paths are uploaded create-only.
    ///
    /// # Errors
    /// Call-setup failures only; per-path failures (including
    /// `VersionConflict` and malformed paths) are in the report
    #[instrument(skip(self, root, paths, token), fields(count = paths.len()))]
    pub async fn update_remote_files<S: AsRef<str>>(
        &self,
        graph_id: &str,
        root: &Path,
        paths: &[S],
        token: &str,
    ) -> Result<BatchReport<Applied, String>, SyncError> {
        let session = self.session(graph_id, root, token)?;
        let requested = RequestedPaths::parse(paths);
        let ops = requested
            .valid()
            .into_iter()
            .map(|path| {
                let expected = session
                    .ledger
                    .get(&path)
                    .map_or(RemoteVersion::ABSENT, |ack| ack.version);
                SyncOperation::upload(path, Some(expected))
            })
            .collect();
        let report = self.coordinator().execute(&session, ops).await;
        Ok(requested.report(report))
    }

    /// Compare-and-swap upload of one file
    ///
    /// Succeeds only if the server still holds `expected_version`; `0`
    /// means the file must not exist yet. Returns the new version.
    ///
    /// # Errors
    /// `VersionConflict` when someone else wrote first, plus any transfer error
    #[instrument(skip(self, root, token))]
    pub async fn update_remote_file_with_version(
        &self,
        graph_id: &str,
        root: &Path,
        path: &str,
        expected_version: u64,
        token: &str,
    ) -> Result<RemoteVersion, SyncError> {
        let session = self.session(graph_id, root, token)?;
        let op = SyncOperation::upload(
            RelativePath::new(path)?,
            Some(RemoteVersion::new(expected_version)),
        );

        let mut report = self.coordinator().execute(&session, vec![op]).await;
        match report.items.pop().map(|outcome| outcome.result) {
            Some(Ok(applied)) => applied
                .version()
                .ok_or_else(|| SyncError::Io(format!("upload of {path} reported no version"))),
            Some(Err(e)) => Err(e),
            None => Err(SyncError::Io(format!("upload of {path} produced no result"))),
        }
    }

    /// Delete the listed paths on the server
    ///
    /// Deleting a path that is already gone succeeds.
    ///
    /// # Errors
    /// Call-setup failures only; a malformed path fails its own item
    #[instrument(skip(self, root, paths, token), fields(count = paths.len()))]
    pub async fn delete_remote_files<S: AsRef<str>>(
        &self,
        graph_id: &str,
        root: &Path,
        paths: &[S],
        token: &str,
    ) -> Result<BatchReport<Applied, String>, SyncError> {
        let session = self.session(graph_id, root, token)?;
        let requested = RequestedPaths::parse(paths);
        let ops = SyncDiffEngine::plan_delete_remote(&requested.valid());
        let report = self.coordinator().execute(&session, ops).await;
        Ok(requested.report(report))
    }

    /// Reconcile the whole graph in both directions
    ///
    /// Conflicts are reported in the summary and left untouched. Nothing is
    /// ever deleted by this call.
    ///
    /// # Errors
    /// Call-setup failures, or a failure to list either side
    #[instrument(skip(self, root, token))]
    pub async fn sync_graph(
        &self,
        graph_id: &str,
        root: &Path,
        token: &str,
    ) -> Result<SyncSummary, SyncError> {
        let session = self.session(graph_id, root, token)?;
        let coordinator = self.coordinator();

        let listing = coordinator.remote().list_files(&session.remote).await?;
        let (remote, undecodable) = index_remote(&session.crypto, listing);
        let local: HashMap<_, _> = coordinator
            .store()
            .scan_all(&session.root)
            .await?
            .into_iter()
            .map(|record| (record.path.clone(), record))
            .collect();
        let plan = SyncDiffEngine::classify(&local, &remote, &session.ledger.snapshot());

        for (path, ack) in plan.converged {
            session.ledger.record(path, ack);
        }
        let report = coordinator.execute(&session, plan.operations).await;
        info!(
            graph_id = %session.graph_id,
            %report,
            conflicts = plan.conflicts.len(),
            "Graph sync finished"
        );

        Ok(SyncSummary {
            report,
            conflicts: plan.conflicts,
            undecodable: undecodable.into_iter().map(|(key, _)| key).collect(),
        })
    }
}

/// Remote metadata for `paths`, keyed by plain path
async fn remote_snapshot(
    coordinator: &TransferCoordinator,
    session: &GraphSession,
    paths: &[RelativePath],
) -> Result<HashMap<RelativePath, RemoteFileRecord>, SyncError> {
    let mut keys = HashMap::with_capacity(paths.len());
    for path in paths {
        keys.insert(session.crypto.encode_path(path)?, path.clone());
    }
    let wanted: Vec<EncodedPath> = keys.keys().cloned().collect();
    let found = coordinator
        .remote()
        .get_files(&session.remote, &wanted)
        .await?;

    Ok(found
        .into_iter()
        .filter_map(|(key, descriptor)| match keys.get(&key) {
            Some(path) => Some((path.clone(), descriptor.record())),
            None => {
                warn!(key = %key, "Server returned a key that was not requested");
                None
            }
        })
        .collect())
}

/// One outcome per requested path; paths with no result are reported missing
fn in_request_order<T: Clone>(
    paths: Vec<RelativePath>,
    results: HashMap<RelativePath, Result<T, SyncError>>,
) -> BatchReport<T> {
    paths
        .into_iter()
        .map(|path| {
            let result = results
                .get(&path)
                .cloned()
                .unwrap_or_else(|| Err(SyncError::NotFound(path.to_string())));
            PathOutcome { path, result }
        })
        .collect()
}
