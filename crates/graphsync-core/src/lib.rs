//! graphsync core - domain types and contracts
//!
//! This crate holds everything the other graphsync crates agree on:
//! - **Domain types** - `GraphId`, `RelativePath`, `ContentDigest`, `RemoteVersion`,
//!   file records, `SyncOperation`, `Conflict`, `ProgressEvent`
//! - **Error taxonomy** - `SyncError`, `CryptoError`, `DomainError` and per-path batch results
//! - **Port definitions** - `IRemoteStore` and `IProgressReporter`, implemented by adapter crates
//! - **Configuration** - YAML-backed `Config`
//!
//! # Architecture
//!
//! The domain module has no I/O. Ports define the trait seams that the
//! remote transport and the progress dispatcher plug into, so the sync
//! engine can be exercised against in-memory fakes.

pub mod config;
pub mod domain;
pub mod ports;
