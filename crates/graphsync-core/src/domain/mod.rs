//! Domain entities
//!
//! - Newtypes for identifiers, paths, digests and versions
//! - Local and remote file records and the acknowledgement record
//! - Sync operations, conflicts and progress events
//! - Error taxonomy and per-path batch results

pub mod errors;
pub mod newtypes;
pub mod operation;
pub mod progress;
pub mod records;

pub use errors::{BatchReport, CryptoError, DomainError, PathOutcome, SyncError};
pub use newtypes::*;
pub use operation::{Conflict, OperationKind, SyncOperation, TransferDirection};
pub use progress::{percent_of, ProgressEvent};
pub use records::{AckRecord, LocalFileRecord, RemoteFileRecord};
