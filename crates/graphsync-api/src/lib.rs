//! graphsync API - the operation surface exposed to hosts
//!
//! A [`SyncContext`] owns every piece of process-wide state: network
//! settings, the cancellation token, the progress callback and per-graph
//! keys and ack ledgers. Hosts either build one explicitly or use the
//! process-wide instance from [`init_global`].
//!
//! ## Modules
//!
//! - [`context`] - Context object, ambient settings and graph resolution
//! - `local` - Local metadata, rename and delete
//! - `remote` - Fetch, update, delete and full reconciliation
//! - [`crypto`] - Key generation, passphrase envelopes and filename encryption
//! - [`logging`] - Subscriber bootstrap

pub mod context;
pub mod crypto;
mod local;
pub mod logging;
mod remote;

pub use context::{global, init_global, GraphState, RemoteFactory, SyncContext};
pub use crypto::{decrypt_fnames, encrypt_fnames, keygen, KeypairText};
pub use graphsync_sync::{Applied, ProgressCallback};
pub use logging::init_logging;
pub use remote::SyncSummary;
