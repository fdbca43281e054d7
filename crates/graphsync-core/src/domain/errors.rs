//! Domain error types
//!
//! Three layers of failure live here:
//! - [`DomainError`] for values that fail validation at construction time
//! - [`CryptoError`] for envelope, filename and key failures
//! - [`SyncError`], the taxonomy every sync operation reports through,
//!   together with the per-path batch result types

use std::fmt;

use thiserror::Error;

use super::newtypes::{RelativePath, RemoteVersion};

/// Errors that can occur while constructing or validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid relative or absolute path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Malformed content digest
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Malformed encrypted filename
    #[error("Invalid encoded path: {0}")]
    InvalidEncodedPath(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Generic argument validation failure
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failures raised by content and filename encryption or key handling
///
/// `WrongPassphrase` and `CorruptData` are never merged: the first means the
/// key material does not match the envelope, the second that the bytes
/// themselves are damaged or were never an envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Wrong passphrase or key")]
    WrongPassphrase,

    #[error("Corrupt data: {0}")]
    CorruptData(String),

    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The platform's secure randomness source failed. Not retried.
    #[error("Secure randomness unavailable")]
    RandomnessUnavailable,
}

/// The error taxonomy shared by every sync operation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A compare-and-swap write was rejected because someone else wrote first
    #[error("Version conflict on {path}: expected {expected}, server has {actual}")]
    VersionConflict {
        path: String,
        expected: RemoteVersion,
        actual: RemoteVersion,
    },

    #[error("Operation cancelled")]
    Cancelled,

    /// Retryable network failure (timeout, 5xx, throttling, refused connection)
    #[error("Transient network error: {0}")]
    NetworkTransient(String),

    /// Permanent network failure (authentication, forbidden, bad request)
    #[error("Network error: {0}")]
    NetworkFatal(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Decrypted content does not hash to the digest the server advertised
    #[error("Content digest mismatch for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A batch completed with at least one failed item
    #[error("{failed} of {total} items failed")]
    PartialBatchFailure { failed: usize, total: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl SyncError {
    /// Whether the failure may succeed if the same request is issued again
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::NetworkTransient(_))
    }

    /// Short machine-readable code, stable across releases
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::NotFound(_) => "NotFound",
            SyncError::PermissionDenied(_) => "PermissionDenied",
            SyncError::VersionConflict { .. } => "VersionConflict",
            SyncError::Cancelled => "Cancelled",
            SyncError::NetworkTransient(_) => "NetworkTransient",
            SyncError::NetworkFatal(_) => "NetworkFatal",
            SyncError::Crypto(CryptoError::WrongPassphrase) => "WrongPassphrase",
            SyncError::Crypto(CryptoError::UnsupportedVersion(_)) => "UnsupportedVersion",
            SyncError::Crypto(_) | SyncError::IntegrityMismatch { .. } => "CorruptData",
            SyncError::PartialBatchFailure { .. } => "PartialBatchFailure",
            SyncError::InvalidArgument(_) => "InvalidArgument",
            SyncError::Io(_) => "Io",
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SyncError::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => SyncError::PermissionDenied(err.to_string()),
            _ => SyncError::Io(err.to_string()),
        }
    }
}

impl From<DomainError> for SyncError {
    fn from(err: DomainError) -> Self {
        SyncError::InvalidArgument(err.to_string())
    }
}

// ============================================================================
// Per-path batch results
// ============================================================================

/// Outcome of one item of a batch operation
///
/// `P` is how the item is named: a validated [`RelativePath`] inside the
/// engine, or the caller's raw string at the API edge where an entry may
/// fail validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOutcome<T, P = RelativePath> {
    pub path: P,
    pub result: Result<T, SyncError>,
}

impl<T, P> PathOutcome<T, P> {
    pub fn ok(path: P, value: T) -> Self {
        Self {
            path,
            result: Ok(value),
        }
    }

    pub fn err(path: P, error: SyncError) -> Self {
        Self {
            path,
            result: Err(error),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Mixed list of per-item successes and failures, in request order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport<T, P = RelativePath> {
    pub items: Vec<PathOutcome<T, P>>,
}

impl<T, P> BatchReport<T, P> {
    pub fn new(items: Vec<PathOutcome<T, P>>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &PathOutcome<T, P>> {
        self.items.iter().filter(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PathOutcome<T, P>> {
        self.items.iter().filter(|o| o.result.is_err())
    }

    /// True if any item failed with `Cancelled`
    pub fn was_cancelled(&self) -> bool {
        self.items
            .iter()
            .any(|o| matches!(o.result, Err(SyncError::Cancelled)))
    }

    /// Collapses the report: `Ok` only when every item succeeded
    ///
    /// # Errors
    /// Returns `SyncError::PartialBatchFailure` carrying the failure count
    pub fn into_result(self) -> Result<Vec<(P, T)>, SyncError> {
        let total = self.items.len();
        let failed = self.items.iter().filter(|o| o.result.is_err()).count();
        if failed > 0 {
            return Err(SyncError::PartialBatchFailure { failed, total });
        }
        Ok(self
            .items
            .into_iter()
            .filter_map(|o| o.result.ok().map(|v| (o.path, v)))
            .collect())
    }
}

impl<T, P> FromIterator<PathOutcome<T, P>> for BatchReport<T, P> {
    fn from_iter<I: IntoIterator<Item = PathOutcome<T, P>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T, P> fmt::Display for BatchReport<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failed().count();
        write!(f, "{} ok, {} failed", self.items.len() - failed, failed)
    }
}
