//! Pending batch cache.
//!
//! Holds multi-signed batches awaiting inclusion in a proposal. Insertion
//! order is preserved so proposals drain oldest-first; duplicates are
//! detected by batch hash. Batches leave the cache only when one of their
//! transactions reaches a terminal state in a committed block.

use ledger_types::{Batch, Hash, Transaction};
use std::collections::HashSet;

/// Insertion-ordered, deduplicating batch store.
#[derive(Debug, Default)]
pub struct BatchCache {
    batches: Vec<Batch>,
    hashes: HashSet<Hash>,
    /// Total transactions across all cached batches.
    tx_count: usize,
}

impl BatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a batch. Returns whether it was new.
    pub fn insert(&mut self, batch: Batch) -> bool {
        if !self.hashes.insert(batch.hash()) {
            return false;
        }
        self.tx_count += batch.transactions().len();
        self.batches.push(batch);
        true
    }

    /// Remove every batch containing any of the given transaction hashes.
    pub fn remove_by_tx_hashes(&mut self, hashes: &HashSet<Hash>) {
        let mut removed_txs = 0;
        let kept: Vec<Batch> = std::mem::take(&mut self.batches)
            .into_iter()
            .filter(|batch| {
                let hit = batch
                    .transactions()
                    .iter()
                    .any(|tx| hashes.contains(&tx.hash()));
                if hit {
                    removed_txs += batch.transactions().len();
                    self.hashes.remove(&batch.hash());
                }
                !hit
            })
            .collect();
        self.batches = kept;
        self.tx_count -= removed_txs;
    }

    /// Collect transactions for a proposal, oldest batch first, stopping at
    /// the first batch that would push the total over `limit`. Batches are
    /// never split and stay cached until committed.
    pub fn collect_transactions(&self, limit: usize) -> Vec<Transaction> {
        let mut collected = Vec::new();
        for batch in &self.batches {
            if collected.len() + batch.transactions().len() > limit {
                break;
            }
            collected.extend(batch.transactions().iter().cloned());
        }
        collected
    }

    /// Total transactions currently cached.
    pub fn tx_count(&self) -> usize {
        self.tx_count
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Iterate cached batches in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Batch> {
        self.batches.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::test_utils::test_batch;

    #[test]
    fn insert_is_idempotent() {
        let mut cache = BatchCache::new();
        let batch = test_batch("alice@test", 1);

        assert!(cache.insert(batch.clone()));
        assert!(!cache.insert(batch));
        assert_eq!(cache.tx_count(), 1);
    }

    #[test]
    fn collect_respects_limit_and_batch_boundaries() {
        let mut cache = BatchCache::new();
        for nonce in 0..5 {
            cache.insert(test_batch("alice@test", nonce));
        }

        assert_eq!(cache.collect_transactions(3).len(), 3);
        assert_eq!(cache.collect_transactions(100).len(), 5);
        // Collection does not remove.
        assert_eq!(cache.tx_count(), 5);
    }

    #[test]
    fn collect_preserves_insertion_order() {
        let mut cache = BatchCache::new();
        let first = test_batch("alice@test", 1);
        let second = test_batch("alice@test", 2);
        cache.insert(first.clone());
        cache.insert(second);

        let txs = cache.collect_transactions(1);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].hash(), first.transactions()[0].hash());
    }

    #[test]
    fn removal_by_tx_hash_maintains_count() {
        let mut cache = BatchCache::new();
        let first = test_batch("alice@test", 1);
        let second = test_batch("alice@test", 2);
        cache.insert(first.clone());
        cache.insert(second.clone());

        let mut committed = HashSet::new();
        committed.insert(first.transactions()[0].hash());
        cache.remove_by_tx_hashes(&committed);

        assert_eq!(cache.tx_count(), 1);
        assert!(cache.insert(first), "removed batch can be re-inserted");
        assert!(!cache.insert(second), "surviving batch stays deduplicated");
    }
}
