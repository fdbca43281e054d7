//! graphsync remote - HTTP transport to the sync backend
//!
//! Provides an async client for:
//! - Listing a graph and resolving download descriptors
//! - Streaming downloads and uploads with progress and cancellation
//! - Compare-and-swap commits and idempotent deletes
//!
//! ## Modules
//!
//! - [`client`] - `RemoteClient`, one method per backend endpoint
//! - [`provider`] - `IRemoteStore` implementation over `RemoteClient`
//! - [`retry`] - backoff policy and `Retry-After` parsing
//! - [`types`] - JSON request and response bodies

pub mod client;
pub mod provider;
pub mod retry;
pub mod types;

use std::time::Duration;

use graphsync_core::domain::{RemoteVersion, SyncError};
use thiserror::Error;

pub use client::{validate_proxy, KeyResults, RemoteClient};
pub use retry::{RetryClass, RetryPolicy};

/// Errors that can occur when communicating with the sync backend
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A compare-and-swap precondition failed
    #[error("Version conflict on {key}: expected {expected}, server has {actual}")]
    VersionConflict {
        key: String,
        expected: RemoteVersion,
        actual: RemoteVersion,
    },

    /// The request was malformed from the server's point of view
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// The connection could not be established; no request bytes were sent
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Any other transport failure, possibly after bytes went out
    #[error("Network error: {0}")]
    Network(String),

    /// Body ended before the advertised length
    #[error("Incomplete download: got {received} of {expected} bytes")]
    Incomplete { received: u64, expected: u64 },

    #[error("Request cancelled")]
    Cancelled,

    /// The response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The backend answered with an error message in a successful response
    #[error("Backend error: {0}")]
    Backend(String),
}

impl RemoteError {
    /// Failures that may go away if the same request is sent again
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::TooManyRequests { .. }
                | RemoteError::ServerError(_)
                | RemoteError::Connect(_)
                | RemoteError::Timeout(_)
                | RemoteError::Network(_)
                | RemoteError::Incomplete { .. }
        )
    }

    /// Failures where no request bytes reached the server
    ///
    /// A 429 is an answer to a request that was sent, so it does not count.
    #[must_use]
    pub fn is_unprocessed(&self) -> bool {
        matches!(self, RemoteError::Connect(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            RemoteError::Connect(err.to_string())
        } else if err.is_timeout() {
            RemoteError::Timeout(err.to_string())
        } else if err.is_decode() {
            RemoteError::InvalidResponse(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(msg) => SyncError::NotFound(msg),
            RemoteError::VersionConflict {
                key,
                expected,
                actual,
            } => SyncError::VersionConflict {
                path: key,
                expected,
                actual,
            },
            RemoteError::Cancelled => SyncError::Cancelled,
            RemoteError::Forbidden(msg) => SyncError::PermissionDenied(msg),
            e @ (RemoteError::Unauthorized(_)
            | RemoteError::BadRequest(_)
            | RemoteError::InvalidResponse(_)
            | RemoteError::Backend(_)) => SyncError::NetworkFatal(e.to_string()),
            e => SyncError::NetworkTransient(e.to_string()),
        }
    }
}
