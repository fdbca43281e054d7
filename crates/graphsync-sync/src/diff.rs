//! Sync diff engine
//!
//! Compares a local snapshot, a remote snapshot and the ack ledger and
//! decides, per path, which transfer (if any) reconciles the two sides.
//!
//! ## Classification
//!
//! | local | remote | since last ack            | result                          |
//! |-------|--------|---------------------------|---------------------------------|
//! | yes   | no     | -                         | Upload (create-only)            |
//! | no    | yes    | -                         | Download                        |
//! | yes   | yes    | neither changed           | Unchanged                       |
//! | yes   | yes    | only local changed        | Upload, expecting acked version |
//! | yes   | yes    | only remote changed       | Download                        |
//! | yes   | yes    | both changed              | Conflict (unless same content)  |
//!
//! Deletions are never inferred from absence. A file missing on one side
//! is transferred, not removed from the other; removal only happens through
//! an explicit delete operation.

use std::collections::{BTreeSet, HashMap};

use graphsync_core::domain::{
    AckRecord, Conflict, CryptoError, EncodedPath, LocalFileRecord, RelativePath,
    RemoteFileRecord, RemoteVersion, SyncOperation,
};
use graphsync_crypto::EncryptionContext;
use tracing::{debug, info, warn};

/// What reconciling one path requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Upload { expected_version: RemoteVersion },
    Download { version: RemoteVersion },
    /// Both sides already agree
    Unchanged,
    /// Both sides hold identical content but the ledger does not know it yet
    Converged(AckRecord),
    Conflict(Box<Conflict>),
    /// Neither side has the file
    Absent,
}

/// Operations and conflicts for a set of paths
#[derive(Debug, Clone, Default)]
pub struct DiffPlan {
    pub operations: Vec<SyncOperation>,
    pub conflicts: Vec<Conflict>,
    pub unchanged: Vec<RelativePath>,
    /// Acks to record without transferring anything
    pub converged: Vec<(RelativePath, AckRecord)>,
}

impl DiffPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.conflicts.is_empty()
    }
}

/// Stateless classifier over metadata snapshots
pub struct SyncDiffEngine;

impl SyncDiffEngine {
    /// Classify a single path
    #[must_use]
    pub fn classify_path(
        path: &RelativePath,
        local: Option<&LocalFileRecord>,
        remote: Option<&RemoteFileRecord>,
        ack: Option<&AckRecord>,
    ) -> Classification {
        match (local, remote) {
            (None, None) => Classification::Absent,
            (Some(_), None) => Classification::Upload {
                expected_version: RemoteVersion::ABSENT,
            },
            (None, Some(r)) => Classification::Download { version: r.version },
            (Some(l), Some(r)) => {
                let same_content = l.digest == r.checksum;
                let Some(ack) = ack else {
                    // no shared history: equal content is agreement, anything else diverged
                    return if same_content {
                        Classification::Converged(AckRecord::new(r.version, l.digest.clone()))
                    } else {
                        conflict(path, l, r, None)
                    };
                };

                let local_changed = l.digest != ack.digest;
                let remote_changed = r.version != ack.version;
                match (local_changed, remote_changed) {
                    (false, false) => Classification::Unchanged,
                    (true, false) => Classification::Upload {
                        expected_version: ack.version,
                    },
                    (false, true) => Classification::Download { version: r.version },
                    (true, true) if same_content => {
                        Classification::Converged(AckRecord::new(r.version, l.digest.clone()))
                    }
                    (true, true) => conflict(path, l, r, Some(ack)),
                }
            }
        }
    }

    /// Classify every path present in either snapshot
    #[must_use]
    pub fn classify(
        local: &HashMap<RelativePath, LocalFileRecord>,
        remote: &HashMap<RelativePath, RemoteFileRecord>,
        acks: &HashMap<RelativePath, AckRecord>,
    ) -> DiffPlan {
        let paths: BTreeSet<&RelativePath> = local.keys().chain(remote.keys()).collect();
        Self::classify_paths(paths.into_iter(), local, remote, acks)
    }

    /// Classify only the listed paths
    pub fn classify_paths<'a>(
        paths: impl Iterator<Item = &'a RelativePath>,
        local: &HashMap<RelativePath, LocalFileRecord>,
        remote: &HashMap<RelativePath, RemoteFileRecord>,
        acks: &HashMap<RelativePath, AckRecord>,
    ) -> DiffPlan {
        let mut plan = DiffPlan::default();
        for path in paths {
            match Self::classify_path(path, local.get(path), remote.get(path), acks.get(path)) {
                Classification::Upload { expected_version } => plan
                    .operations
                    .push(SyncOperation::upload(path.clone(), Some(expected_version))),
                Classification::Download { version } => plan
                    .operations
                    .push(SyncOperation::download(path.clone(), Some(version))),
                Classification::Unchanged => plan.unchanged.push(path.clone()),
                Classification::Converged(ack) => plan.converged.push((path.clone(), ack)),
                Classification::Conflict(c) => plan.conflicts.push(*c),
                Classification::Absent => {}
            }
        }

        info!(
            operations = plan.operations.len(),
            conflicts = plan.conflicts.len(),
            unchanged = plan.unchanged.len(),
            "Computed sync plan"
        );
        plan
    }

    /// Explicit remote deletions; the only way a `DeleteRemote` is produced
    #[must_use]
    pub fn plan_delete_remote(paths: &[RelativePath]) -> Vec<SyncOperation> {
        paths.iter().cloned().map(SyncOperation::delete_remote).collect()
    }

    /// Explicit local deletions; the only way a `DeleteLocal` is produced
    #[must_use]
    pub fn plan_delete_local(paths: &[RelativePath]) -> Vec<SyncOperation> {
        paths.iter().cloned().map(SyncOperation::delete_local).collect()
    }
}

fn conflict(
    path: &RelativePath,
    local: &LocalFileRecord,
    remote: &RemoteFileRecord,
    ack: Option<&AckRecord>,
) -> Classification {
    info!(
        path = %path,
        local_digest = %local.digest,
        remote_version = %remote.version,
        "Conflict detected: both sides changed"
    );
    Classification::Conflict(Box::new(Conflict {
        path: path.clone(),
        local_digest: local.digest.clone(),
        remote_version: remote.version,
        remote_checksum: remote.checksum.clone(),
        acked: ack.cloned(),
    }))
}

/// Decode a remote listing into a path-keyed snapshot
///
/// Names that do not decrypt under this graph's key are returned separately
/// instead of failing the whole snapshot.
pub fn index_remote(
    crypto: &EncryptionContext,
    records: Vec<RemoteFileRecord>,
) -> (
    HashMap<RelativePath, RemoteFileRecord>,
    Vec<(EncodedPath, CryptoError)>,
) {
    let mut indexed = HashMap::with_capacity(records.len());
    let mut undecodable = Vec::new();
    for record in records {
        match crypto.decode_path(&record.encoded_path) {
            Ok(path) => {
                indexed.insert(path, record);
            }
            Err(e) => {
                warn!(key = %record.encoded_path, error = %e, "Remote name does not decode");
                undecodable.push((record.encoded_path, e));
            }
        }
    }
    debug!(decoded = indexed.len(), failed = undecodable.len(), "Indexed remote snapshot");
    (indexed, undecodable)
}
