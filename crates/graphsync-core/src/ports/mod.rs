//! Port definitions (hexagonal architecture interfaces)
//!
//! - [`IRemoteStore`] - encrypted file operations against the sync backend
//! - [`IProgressReporter`] - transfer progress delivery

pub mod progress;
pub mod remote_store;

pub use progress::IProgressReporter;
pub use remote_store::{
    ignore_progress, ByteProgress, IRemoteStore, RemoteContext, RemoteDescriptor, UploadRequest,
};
