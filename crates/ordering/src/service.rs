//! On-demand ordering service.
//!
//! Keeps a sliding window of proposals keyed by round. A proposal for a
//! round is assembled at most once, on the first request, by draining the
//! batch cache up to the transaction limit. Rounds far ahead of the current
//! one are refused so a Byzantine requester cannot make the service build
//! proposals for arbitrary futures.

use crate::batch_cache::BatchCache;
use crate::config::OrderingConfig;
use crate::tx_cache::TxPresenceCache;
use ledger_types::{Batch, BlockHeight, Hash, Proposal, Round};
use std::collections::HashSet;
use tracing::{debug, info};

/// Round-keyed proposal store plus the pending batch cache.
pub struct OrderingService {
    transaction_limit: usize,
    /// Number of proposal rounds retained behind the current one.
    window: usize,
    current_round: Round,
    /// `None` entries record rounds for which assembly ran but produced no
    /// transactions, so repeated requests stay stable.
    proposals: std::collections::BTreeMap<Round, Option<Proposal>>,
    batches: BatchCache,
    tx_cache: TxPresenceCache,
}

impl OrderingService {
    pub fn new(config: &OrderingConfig) -> Self {
        Self {
            transaction_limit: config.transaction_limit,
            window: config.proposal_window,
            current_round: Round::default(),
            proposals: std::collections::BTreeMap::new(),
            batches: BatchCache::new(),
            tx_cache: TxPresenceCache::new(),
        }
    }

    /// Admit batches, refusing replays of terminally-processed transactions.
    pub fn on_batches(&mut self, batches: Vec<Batch>) {
        let total = batches.len();
        let mut inserted = 0;
        for batch in batches {
            if self.tx_cache.batch_already_processed(&batch) {
                debug!(batch_hash = %batch.hash(), "refusing replayed batch");
                continue;
            }
            if self.batches.insert(batch) {
                inserted += 1;
            }
        }
        info!(total, inserted, cached_txs = self.batches.tx_count(), "batches received");
    }

    /// Return the proposal for a round, assembling it on first request.
    ///
    /// Assembly only happens for rounds at most two steps past the current
    /// one; anything further returns `None` without side effects.
    pub fn on_request_proposal(&mut self, round: Round, now_ms: u64) -> Option<Proposal> {
        if let Some(entry) = self.proposals.get(&round) {
            return entry.clone();
        }

        let distance = if round.block_round == self.current_round.block_round {
            round.reject_round.saturating_sub(self.current_round.reject_round) as u64
        } else {
            round.block_round.saturating_sub(self.current_round.block_round)
        };
        if distance > 2 {
            debug!(%round, current = %self.current_round, "round too far ahead, not packing");
            return None;
        }

        self.pack_proposal(round, now_ms)
    }

    /// Whether a proposal entry exists for the round.
    pub fn has_proposal(&self, round: Round) -> bool {
        self.proposals.contains_key(&round)
    }

    /// Advance the current round and evict entries outside the window.
    pub fn on_collaboration_outcome(&mut self, round: Round) {
        info!(%round, "collaboration outcome");
        self.current_round = round;
        self.try_erase(round);
    }

    /// Drop batches and remember hashes for transactions that reached a
    /// terminal state in a committed block.
    pub fn on_txs_committed(&mut self, hashes: HashSet<Hash>) {
        self.batches.remove_by_tx_hashes(&hashes);
        self.tx_cache.mark(hashes);
    }

    /// The pending batch cache.
    pub fn batches(&self) -> &BatchCache {
        &self.batches
    }

    /// The terminal-transaction cache.
    pub fn tx_cache(&self) -> &TxPresenceCache {
        &self.tx_cache
    }

    pub fn current_round(&self) -> Round {
        self.current_round
    }

    fn pack_proposal(&mut self, round: Round, now_ms: u64) -> Option<Proposal> {
        let txs = if self.batches.is_empty() {
            Vec::new()
        } else {
            self.batches.collect_transactions(self.transaction_limit)
        };

        let proposal = if txs.is_empty() {
            debug!(%round, "no transactions to create a proposal");
            None
        } else {
            debug!(%round, tx_count = txs.len(), "packed proposal");
            Some(Proposal::new(
                BlockHeight(round.block_round + 1),
                now_ms,
                txs,
            ))
        };

        self.proposals.insert(round, proposal.clone());
        proposal
    }

    /// Keep at most `window` rounds before the current one; evict the rest.
    ///
    /// Because rounds order by `(block_round, reject_round)`, the survivors
    /// are the most recent commit proposal and the reject chain that
    /// followed it.
    fn try_erase(&mut self, current: Round) {
        let older: Vec<Round> = self
            .proposals
            .range(..current)
            .rev()
            .skip(self.window)
            .map(|(round, _)| *round)
            .collect();
        for round in older {
            debug!(%round, "erased proposal");
            self.proposals.remove(&round);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::test_utils::test_batch;

    fn service() -> OrderingService {
        OrderingService::new(&OrderingConfig {
            transaction_limit: 4,
            ..OrderingConfig::default()
        })
    }

    #[test]
    fn proposal_is_assembled_once_and_memoized() {
        let mut svc = service();
        svc.on_batches(vec![test_batch("alice@test", 1)]);

        let round = Round::new(0, 0);
        let first = svc.on_request_proposal(round, 100).unwrap();
        assert_eq!(first.height, BlockHeight(1));
        assert_eq!(first.created_ms, 100);
        assert_eq!(first.transactions.len(), 1);

        // Later batches and a different clock do not change the stored entry.
        svc.on_batches(vec![test_batch("alice@test", 2)]);
        let second = svc.on_request_proposal(round, 999).unwrap();
        assert_eq!(second.hash(), first.hash());
    }

    #[test]
    fn empty_cache_yields_no_proposal() {
        let mut svc = service();
        let round = Round::new(0, 0);
        assert!(svc.on_request_proposal(round, 1).is_none());
        assert!(svc.has_proposal(round), "negative result is memoized");
    }

    #[test]
    fn far_future_rounds_are_refused() {
        let mut svc = service();
        svc.on_batches(vec![test_batch("alice@test", 1)]);

        assert!(svc.on_request_proposal(Round::new(3, 0), 1).is_none());
        assert!(!svc.has_proposal(Round::new(3, 0)));

        // Within two rounds is allowed.
        assert!(svc.on_request_proposal(Round::new(2, 0), 1).is_some());
        assert!(svc.on_request_proposal(Round::new(0, 2), 1).is_some());
    }

    #[test]
    fn replayed_batches_are_refused() {
        let mut svc = service();
        let batch = test_batch("alice@test", 1);
        let hashes: HashSet<Hash> =
            batch.transactions().iter().map(|tx| tx.hash()).collect();

        svc.on_txs_committed(hashes);
        svc.on_batches(vec![batch]);
        assert!(svc.batches().is_empty());
    }

    #[test]
    fn transaction_limit_bounds_proposals() {
        let mut svc = service();
        for nonce in 0..10 {
            svc.on_batches(vec![test_batch("alice@test", nonce)]);
        }
        let proposal = svc.on_request_proposal(Round::new(0, 0), 1).unwrap();
        assert_eq!(proposal.transactions.len(), 4);
    }

    #[test]
    fn eviction_keeps_recent_window() {
        let mut svc = service();

        // Assemble entries across a commit and its reject chain.
        for (block, reject) in [(0u64, 0u32), (0, 1), (0, 2), (1, 0), (1, 1)] {
            svc.on_batches(vec![test_batch("alice@test", 100 + block * 10 + reject as u64)]);
            svc.on_request_proposal(Round::new(block, reject), 1);
        }

        svc.on_collaboration_outcome(Round::new(2, 0));

        // Default window is 3: the three rounds closest to (2,0) survive.
        assert!(svc.has_proposal(Round::new(1, 1)));
        assert!(svc.has_proposal(Round::new(1, 0)));
        assert!(svc.has_proposal(Round::new(0, 2)));
        assert!(!svc.has_proposal(Round::new(0, 1)));
        assert!(!svc.has_proposal(Round::new(0, 0)));
    }

    #[test]
    fn committed_txs_leave_the_cache() {
        let mut svc = service();
        let batch = test_batch("alice@test", 1);
        svc.on_batches(vec![batch.clone()]);
        assert_eq!(svc.batches().tx_count(), 1);

        let hashes: HashSet<Hash> =
            batch.transactions().iter().map(|tx| tx.hash()).collect();
        svc.on_txs_committed(hashes);

        assert!(svc.batches().is_empty());
        assert!(svc.tx_cache().contains(&batch.transactions()[0].hash()));
    }
}
