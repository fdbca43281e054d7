//! Integration tests for graphsync-api
//!
//! Every test runs a full [`graphsync_api::SyncContext`] against an
//! in-memory remote and a temporary graph directory.

mod common;
mod test_context;
mod test_local;
mod test_remote;
