//! Ordering state machine.
//!
//! Front door for batches and the driver of per-round proposal flow. On
//! every synchronization outcome it recomputes the round routing, forwards
//! cached batches to the new round's consumers, and requests the proposal
//! from the issuer. All I/O happens through returned [`Action`]s.

use crate::config::OrderingConfig;
use crate::connection::{select_peers, CurrentPeers};
use crate::service::OrderingService;
use ledger_core::{Action, RequestId};
use ledger_types::{
    Batch, Block, Hash, LedgerState, Proposal, Round, SyncOutcome,
};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Combined ordering service and gate.
pub struct OrderingState {
    config: OrderingConfig,
    service: OrderingService,
    current_round: Round,
    routing: Option<CurrentPeers>,
    /// Hash of the block before the newest committed one.
    previous_hash: Hash,
    /// Hash of the newest committed block.
    current_hash: Hash,
}

impl OrderingState {
    pub fn new(config: OrderingConfig) -> Self {
        Self {
            service: OrderingService::new(&config),
            config,
            current_round: Round::default(),
            routing: None,
            previous_hash: Hash::ZERO,
            current_hash: Hash::ZERO,
        }
    }

    pub fn current_round(&self) -> Round {
        self.current_round
    }

    pub fn routing(&self) -> Option<&CurrentPeers> {
        self.routing.as_ref()
    }

    pub fn service(&self) -> &OrderingService {
        &self.service
    }

    /// Client batch ingress. Structurally valid batches are acknowledged and
    /// propagated to the round's three ordering peers.
    #[instrument(skip(self, batch), fields(batch_hash = %batch.hash()))]
    pub fn on_submit_batch(&mut self, batch: Batch, request_id: RequestId) -> Vec<Action> {
        let authorized = batch.transactions().iter().all(|tx| tx.meets_quorum());
        if !authorized {
            warn!("refusing batch below signature quorum");
            return vec![Action::AckBatch {
                request_id,
                accepted: false,
            }];
        }

        let mut actions = vec![Action::AckBatch {
            request_id,
            accepted: true,
        }];
        actions.extend(self.propagate_batches(vec![batch]));
        actions
    }

    /// Batches pushed by a peer (or looped back from ourselves).
    pub fn on_batches_received(&mut self, batches: Vec<Batch>) -> Vec<Action> {
        self.service.on_batches(batches);
        Vec::new()
    }

    /// A peer asks for a round's proposal.
    pub fn on_proposal_request(
        &mut self,
        round: Round,
        request_id: RequestId,
        now_ms: u64,
    ) -> Vec<Action> {
        let proposal = self.service.on_request_proposal(round, now_ms);
        debug!(%round, found = proposal.is_some(), "proposal requested");
        vec![Action::RespondProposal {
            request_id,
            round,
            proposal,
        }]
    }

    /// Reply to our own proposal request. Returns the proposal with replayed
    /// and duplicated transactions stripped, or `None` for a stale or empty
    /// response.
    pub fn on_proposal_response(
        &mut self,
        round: Round,
        proposal: Option<Proposal>,
    ) -> Option<Proposal> {
        if round != self.current_round {
            debug!(%round, current = %self.current_round, "stale proposal response");
            return None;
        }
        let proposal = proposal?;

        let mut seen = HashSet::new();
        let txs: Vec<_> = proposal
            .transactions
            .into_iter()
            .filter(|tx| {
                !self.service.tx_cache().contains(&tx.hash()) && seen.insert(tx.hash())
            })
            .collect();
        if txs.is_empty() {
            debug!(%round, "proposal empty after replay filtering");
            return None;
        }
        Some(Proposal::new(proposal.height, proposal.created_ms, txs))
    }

    /// A block was applied: remember the hash chain and drop its
    /// transactions from the cache.
    pub fn on_block_applied(&mut self, block: &Block) -> Vec<Action> {
        self.previous_hash = block.prev_hash();
        self.current_hash = block.hash();

        let mut hashes: HashSet<Hash> =
            block.transactions().iter().map(|tx| tx.hash()).collect();
        hashes.extend(block.rejected_hashes().iter().copied());
        self.service.on_txs_committed(hashes);
        Vec::new()
    }

    /// Synchronization outcome: advance the round, re-route, resend cached
    /// batches, and request the new round's proposal from its issuer.
    ///
    /// On a commit the next round anchors to the authoritative ledger
    /// height, so a node that just caught up over several blocks lands on
    /// the right round.
    pub fn on_sync_event(&mut self, outcome: SyncOutcome, ledger_state: &LedgerState) -> Vec<Action> {
        let next = match outcome {
            SyncOutcome::Commit => {
                Round::new(ledger_state.top_height.0, ledger_types::FIRST_REJECT_ROUND)
            }
            SyncOutcome::Reject | SyncOutcome::Nothing => self.current_round.next_reject_round(),
        };
        let routing = select_peers(
            next,
            &ledger_state.peers,
            self.previous_hash,
            self.current_hash,
        );
        info!(?outcome, round = %next, issuer = %routing.issuer.pubkey, "round switch");

        self.current_round = next;
        self.service.on_collaboration_outcome(next);

        let mut actions = Vec::new();
        let cached: Vec<Batch> = self.service.batches().iter().cloned().collect();
        if !cached.is_empty() {
            for peer in routing.distinct() {
                actions.push(Action::SendBatches {
                    peer: peer.pubkey,
                    batches: cached.clone(),
                });
            }
        }
        actions.push(Action::RequestProposal {
            peer: routing.issuer.pubkey,
            round: next,
        });

        self.routing = Some(routing);
        actions
    }

    fn propagate_batches(&mut self, batches: Vec<Batch>) -> Vec<Action> {
        let Some(routing) = &self.routing else {
            // No round routing yet: cache locally so the next round switch
            // distributes the batches to its consumers.
            debug!("no routing yet, caching batches locally");
            self.service.on_batches(batches);
            return Vec::new();
        };
        routing
            .distinct()
            .into_iter()
            .map(|peer| Action::SendBatches {
                peer: peer.pubkey,
                batches: batches.clone(),
            })
            .collect()
    }

    /// The configured proposal request timeout (used by the runner when
    /// issuing `RequestProposal`).
    pub fn proposal_request_timeout(&self) -> std::time::Duration {
        self.config.proposal_request_timeout
    }
}
