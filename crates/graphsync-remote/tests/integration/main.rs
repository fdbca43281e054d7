//! Integration tests for graphsync-remote
//!
//! Uses wiremock to simulate the sync backend and verifies end-to-end
//! behavior of RemoteClient listing, downloads, commits, deletes and retries.

mod common;

mod test_delete;
mod test_fetch;
mod test_retry;
mod test_update;
