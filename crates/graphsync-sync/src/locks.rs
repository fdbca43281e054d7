//! Path-keyed mutual exclusion
//!
//! No two operations touch the same relative path at once, while distinct
//! paths proceed in parallel. Multi-path operations take their locks in
//! sorted order so two renames over the same pair cannot deadlock.
//! Table entries live only while some guard holds or awaits them.

use std::sync::Arc;

use dashmap::DashMap;
use graphsync_core::domain::RelativePath;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<RelativePath, Arc<Mutex<()>>>;

/// Lock table shared by every transfer of a process
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    locks: Arc<LockTable>,
}

/// Held locks; released on drop, which also evicts entries no other task
/// is waiting on
#[derive(Debug)]
pub struct PathGuard {
    table: Arc<LockTable>,
    held: Vec<(RelativePath, OwnedMutexGuard<()>)>,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        for (path, guard) in self.held.drain(..) {
            drop(guard);
            // the table's own handle is the only one left once nobody waits
            self.table
                .remove_if(&path, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, path: &RelativePath) -> PathGuard {
        self.lock_all(&[path]).await
    }

    /// Lock every path, in sorted order, skipping duplicates
    pub async fn lock_all(&self, paths: &[&RelativePath]) -> PathGuard {
        let mut sorted: Vec<&RelativePath> = paths.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guard = PathGuard {
            table: self.locks.clone(),
            held: Vec::with_capacity(sorted.len()),
        };
        for path in sorted {
            let mutex = self
                .locks
                .entry(path.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let owned = mutex.lock_owned().await;
            guard.held.push((path.clone(), owned));
        }
        guard
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
