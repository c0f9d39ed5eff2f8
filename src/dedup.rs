//! Per-cycle transaction dedup

use std::collections::HashSet;

use crate::types::TxHash;

/// Transactions already classified in the current polling cycle.
///
/// A transaction that emits several bridge events is acted on once. Built
/// fresh for every cycle.
#[derive(Debug, Default)]
pub struct DedupTracker {
    seen: HashSet<TxHash>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, tx_hash: &TxHash) -> bool {
        self.seen.contains(tx_hash)
    }

    /// Returns false if `tx_hash` was already marked
    pub fn mark_seen(&mut self, tx_hash: TxHash) -> bool {
        self.seen.insert(tx_hash)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
