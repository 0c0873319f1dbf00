//! Transaction presence cache.
//!
//! Remembers the hashes of transactions that already reached a terminal
//! state (committed or rejected in some block) so replayed batches are
//! refused before they re-enter the pipeline.

use ledger_types::{Batch, Hash};
use std::collections::HashSet;

/// Set of terminally-processed transaction hashes.
#[derive(Debug, Default)]
pub struct TxPresenceCache {
    seen: HashSet<Hash>,
}

impl TxPresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record hashes from a committed block (both applied and rejected).
    pub fn mark<I: IntoIterator<Item = Hash>>(&mut self, hashes: I) {
        self.seen.extend(hashes);
    }

    /// Whether this transaction hash reached a terminal state.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.seen.contains(hash)
    }

    /// A batch is already processed when any member transaction is.
    pub fn batch_already_processed(&self, batch: &Batch) -> bool {
        batch
            .transactions()
            .iter()
            .any(|tx| self.seen.contains(&tx.hash()))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
