//! File metadata records
//!
//! [`LocalFileRecord`] is produced by scanning the graph root,
//! [`RemoteFileRecord`] is a read-only snapshot of what the server holds,
//! and [`AckRecord`] remembers the last state both sides agreed on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{CanonicalPath, ContentDigest, EncodedPath, RelativePath, RemoteVersion};

/// Metadata for one regular file under a graph root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFileRecord {
    /// Root-relative, NFC-normalized key
    pub path: RelativePath,
    /// Name exactly as found on disk, which may be NFD on some filesystems
    pub incoming_name: String,
    pub canonical_path: CanonicalPath,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub ctime: Option<DateTime<Utc>>,
    pub digest: ContentDigest,
    /// Remote version last acknowledged for this path, `None` if never synced
    pub acked_version: Option<RemoteVersion>,
}

impl LocalFileRecord {
    /// Whether the on-disk name differs from the normalized key
    #[must_use]
    pub fn has_denormalized_name(&self) -> bool {
        self.incoming_name != self.path.as_str()
    }
}

/// Snapshot of a file as stored by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileRecord {
    pub encoded_path: EncodedPath,
    /// Ciphertext size in bytes
    pub size: u64,
    pub version: RemoteVersion,
    /// Digest of the plaintext, as recorded by the uploader
    pub checksum: ContentDigest,
    pub last_modified: Option<DateTime<Utc>>,
}

/// The last state both sides agreed on for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckRecord {
    pub version: RemoteVersion,
    pub digest: ContentDigest,
}

impl AckRecord {
    pub fn new(version: RemoteVersion, digest: ContentDigest) -> Self {
        Self { version, digest }
    }
}
