//! Sync operations and conflicts
//!
//! A [`SyncOperation`] is one unit of work for the transfer coordinator.
//! A [`Conflict`] is what the diff engine reports instead of an operation
//! when both sides diverged since the last acknowledgement.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::newtypes::{ContentDigest, OperationId, RelativePath, RemoteVersion};
use super::records::AckRecord;

/// Direction of a content transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::Upload => write!(f, "upload"),
            TransferDirection::Download => write!(f, "download"),
        }
    }
}

/// Kind of work to perform for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OperationKind {
    /// Push local content; `expected_version` is the compare-and-swap precondition
    /// (`None` means unconditional)
    Upload {
        path: RelativePath,
        expected_version: Option<RemoteVersion>,
    },
    /// Pull remote content; `version` is the snapshot the decision was based on
    Download {
        path: RelativePath,
        version: Option<RemoteVersion>,
    },
    DeleteLocal {
        path: RelativePath,
    },
    DeleteRemote {
        path: RelativePath,
    },
    /// Move a file to a new path on both sides
    Rename {
        from: RelativePath,
        to: RelativePath,
    },
}

/// A classified operation tagged with its identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: OperationId,
    #[serde(flatten)]
    pub kind: OperationKind,
}

impl SyncOperation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            id: OperationId::new(),
            kind,
        }
    }

    pub fn upload(path: RelativePath, expected_version: Option<RemoteVersion>) -> Self {
        Self::new(OperationKind::Upload {
            path,
            expected_version,
        })
    }

    pub fn download(path: RelativePath, version: Option<RemoteVersion>) -> Self {
        Self::new(OperationKind::Download { path, version })
    }

    pub fn delete_local(path: RelativePath) -> Self {
        Self::new(OperationKind::DeleteLocal { path })
    }

    pub fn delete_remote(path: RelativePath) -> Self {
        Self::new(OperationKind::DeleteRemote { path })
    }

    pub fn rename(from: RelativePath, to: RelativePath) -> Self {
        Self::new(OperationKind::Rename { from, to })
    }

    /// The path the operation reports against; for renames, the source
    #[must_use]
    pub fn path(&self) -> &RelativePath {
        match &self.kind {
            OperationKind::Upload { path, .. }
            | OperationKind::Download { path, .. }
            | OperationKind::DeleteLocal { path }
            | OperationKind::DeleteRemote { path } => path,
            OperationKind::Rename { from, .. } => from,
        }
    }

    /// Every path the operation mutates, in lock order
    #[must_use]
    pub fn touched_paths(&self) -> Vec<&RelativePath> {
        match &self.kind {
            OperationKind::Rename { from, to } => {
                let mut paths = vec![from, to];
                paths.sort();
                paths.dedup();
                paths
            }
            _ => vec![self.path()],
        }
    }

    #[must_use]
    pub fn direction(&self) -> Option<TransferDirection> {
        match self.kind {
            OperationKind::Upload { .. } | OperationKind::Rename { .. } => {
                Some(TransferDirection::Upload)
            }
            OperationKind::Download { .. } => Some(TransferDirection::Download),
            _ => None,
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OperationKind::Upload {
                path,
                expected_version: Some(v),
            } => write!(f, "upload {path} (if version {v})"),
            OperationKind::Upload { path, .. } => write!(f, "upload {path}"),
            OperationKind::Download { path, .. } => write!(f, "download {path}"),
            OperationKind::DeleteLocal { path } => write!(f, "delete local {path}"),
            OperationKind::DeleteRemote { path } => write!(f, "delete remote {path}"),
            OperationKind::Rename { from, to } => write!(f, "rename {from} -> {to}"),
        }
    }
}

/// Divergent history on one path: both sides changed since the last ack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub path: RelativePath,
    pub local_digest: ContentDigest,
    pub remote_version: RemoteVersion,
    pub remote_checksum: ContentDigest,
    /// Last agreed state, `None` when both sides created the file independently
    pub acked: Option<AckRecord>,
}
