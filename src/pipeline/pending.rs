//! In-flight transaction tracking

use crate::transaction::NormalizedTransaction;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub tx: NormalizedTransaction,
    pub started_at: DateTime<Utc>,
}

/// Submissions currently in flight, keyed by a pipeline-issued id
///
/// Each submission inserts under its own fresh id and removes that id exactly
/// once, so concurrent submissions never contend on the same entry.
#[derive(Debug, Default)]
pub struct PendingTransactions {
    entries: DashMap<Uuid, PendingEntry>,
}

impl PendingTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `tx` until the returned guard is dropped
    pub fn begin(&self, tx: &NormalizedTransaction) -> PendingGuard<'_> {
        let id = Uuid::new_v4();
        self.entries.insert(
            id,
            PendingEntry {
                tx: tx.clone(),
                started_at: Utc::now(),
            },
        );
        PendingGuard { id, set: self }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &Uuid) -> Option<PendingEntry> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }
}

/// Removes its entry when the submission resolves or is cancelled
#[derive(Debug)]
pub struct PendingGuard<'a> {
    id: Uuid,
    set: &'a PendingTransactions,
}

impl PendingGuard<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.set.entries.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Sender;
    use alloy::primitives::{Bytes, U256};

    fn tx() -> NormalizedTransaction {
        NormalizedTransaction {
            to: None,
            data: Bytes::new(),
            use_call: false,
            from: Sender::Unknown,
            value: U256::ZERO,
            gas_limit: 3_000_000,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn guards_track_and_release_entries() {
        let pending = PendingTransactions::new();
        let first = pending.begin(&tx());
        let second = pending.begin(&tx());
        assert_ne!(first.id(), second.id());
        assert_eq!(pending.len(), 2);
        assert!(pending.get(&first.id()).is_some());

        let first_id = first.id();
        drop(first);
        assert_eq!(pending.len(), 1);
        assert!(pending.get(&first_id).is_none());

        drop(second);
        assert!(pending.is_empty());
    }
}
