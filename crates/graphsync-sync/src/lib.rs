//! graphsync sync - local state, diffing and transfers
//!
//! Provides:
//! - Path canonicalization and local metadata scanning
//! - Atomic local writes with Unicode-normalization aware lookups
//! - Three-way diffing against the ack ledger
//! - Bounded, cancellable transfer execution with per-path locking
//!
//! ## Modules
//!
//! - [`canonical`] - Canonical absolute paths
//! - [`filesystem`] - Local metadata store (scan, read, atomic write, rename, delete)
//! - [`ledger`] - Last acknowledged remote state per path
//! - [`diff`] - Classification of paths into sync operations
//! - [`locks`] - Per-path async mutual exclusion
//! - [`progress`] - Progress queue and per-transfer throttling
//! - [`transfer`] - Transfer coordinator

pub mod canonical;
pub mod diff;
pub mod filesystem;
pub mod ledger;
pub mod locks;
pub mod progress;
pub mod transfer;

pub use canonical::{canonicalize, canonicalize_root};
pub use diff::{index_remote, Classification, DiffPlan, SyncDiffEngine};
pub use filesystem::{digest_bytes, LocalMetadataStore};
pub use ledger::AckLedger;
pub use locks::{PathGuard, PathLocks};
pub use progress::{ProgressCallback, ProgressHub, ProgressSender, TransferProgress};
pub use transfer::{Applied, GraphSession, TransferCoordinator};
