//! Last-acknowledged state per path
//!
//! The ledger is what makes "changed since last sync" answerable: it holds
//! the remote version and local digest both sides agreed on after the most
//! recent successful transfer. It lives for the process lifetime; the
//! remote service is the only persistent store.

use std::collections::HashMap;

use dashmap::DashMap;
use graphsync_core::domain::{AckRecord, LocalFileRecord, RelativePath};
use tracing::debug;

#[derive(Debug, Default)]
pub struct AckLedger {
    acks: DashMap<RelativePath, AckRecord>,
}

impl AckLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &RelativePath) -> Option<AckRecord> {
        self.acks.get(path).map(|a| a.value().clone())
    }

    pub fn record(&self, path: RelativePath, ack: AckRecord) {
        debug!(path = %path, version = %ack.version, "Recorded ack");
        self.acks.insert(path, ack);
    }

    pub fn forget(&self, path: &RelativePath) -> Option<AckRecord> {
        self.acks.remove(path).map(|(_, ack)| ack)
    }

    /// Move the ack for `from` to `to`, replacing any ack `to` had
    pub fn rename(&self, from: &RelativePath, to: &RelativePath) {
        if let Some(ack) = self.forget(from) {
            self.acks.insert(to.clone(), ack);
        } else {
            self.acks.remove(to);
        }
    }

    pub fn snapshot(&self) -> HashMap<RelativePath, AckRecord> {
        self.acks
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Fill `acked_version` on freshly scanned records
    pub fn annotate(&self, record: &mut LocalFileRecord) {
        record.acked_version = self.get(&record.path).map(|a| a.version);
    }

    pub fn len(&self) -> usize {
        self.acks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acks.is_empty()
    }

    pub fn clear(&self) {
        self.acks.clear();
    }
}

#[cfg(test)]
mod tests {
    use graphsync_core::domain::{ContentDigest, RemoteVersion};

    use super::*;

    fn rel(s: &str) -> RelativePath {
        RelativePath::new(s).unwrap()
    }

    fn ack(v: u64) -> AckRecord {
        AckRecord::new(RemoteVersion::new(v), ContentDigest::from_bytes(&[v as u8; 32]))
    }

    #[test]
    fn test_record_and_forget() {
        let ledger = AckLedger::new();
        ledger.record(rel("a.md"), ack(1));
        ledger.record(rel("a.md"), ack(2));
        assert_eq!(ledger.get(&rel("a.md")), Some(ack(2)));
        assert_eq!(ledger.forget(&rel("a.md")), Some(ack(2)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_rename_moves_ack() {
        let ledger = AckLedger::new();
        ledger.record(rel("a.md"), ack(3));
        ledger.record(rel("b.md"), ack(9));

        ledger.rename(&rel("a.md"), &rel("b.md"));
        assert_eq!(ledger.get(&rel("a.md")), None);
        assert_eq!(ledger.get(&rel("b.md")), Some(ack(3)));

        // renaming an unsynced file leaves the target unsynced too
        ledger.rename(&rel("c.md"), &rel("b.md"));
        assert_eq!(ledger.get(&rel("b.md")), None);
    }
}
