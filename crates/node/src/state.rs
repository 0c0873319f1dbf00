//! Node state machine.
//!
//! Composes the ordering and consensus state machines and routes events
//! between them. The composition owns the round lifecycle:
//!
//! 1. a synchronization outcome advances the round and re-routes peers,
//! 2. the ordering gate requests the round's proposal from its issuer,
//! 3. the consensus gate verifies, votes, and collects votes,
//! 4. a commit applies the block and produces the next outcome.

use crate::config::NodeConfig;
use ledger_consensus::ConsensusState;
use ledger_core::{Action, Event, StateMachine};
use ledger_ordering::OrderingState;
use ledger_types::{
    Block, ConsensusOutcome, Hash, KeyPair, LedgerState, PublicKey, Round, SyncOutcome, YacHash,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Combined node state machine.
pub struct NodeStateMachine {
    ordering: OrderingState,
    consensus: ConsensusState,
    ledger_state: Option<LedgerState>,
    /// Outcome waiting for its block to arrive from a peer.
    pending_commit: Option<YacHash>,
    /// Wall clock, milliseconds since the Unix epoch. Fed by the runner so
    /// handling stays deterministic.
    now_ms: u64,
}

impl NodeStateMachine {
    pub fn new(keypair: KeyPair, config: NodeConfig) -> Self {
        Self {
            ordering: OrderingState::new(config.ordering),
            consensus: ConsensusState::new(keypair, config.consensus),
            ledger_state: None,
            pending_commit: None,
            now_ms: 0,
        }
    }

    /// Update the wall clock before handling an event.
    pub fn set_time(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    /// This node's identity key.
    pub fn public_key(&self) -> PublicKey {
        self.consensus.public_key()
    }

    pub fn ordering(&self) -> &OrderingState {
        &self.ordering
    }

    pub fn consensus(&self) -> &ConsensusState {
        &self.consensus
    }

    pub fn ledger_state(&self) -> Option<&LedgerState> {
        self.ledger_state.as_ref()
    }

    pub fn current_round(&self) -> Round {
        self.ordering.current_round()
    }

    /// Boot the node after the world state is restored: learn the chain tip
    /// and enter the first round.
    pub fn initialize(&mut self, last_block: &Block, ledger_state: LedgerState) -> Vec<Action> {
        info!(
            height = ledger_state.top_height.0,
            peers = ledger_state.peers.len(),
            "node initialized"
        );
        self.ordering.on_block_applied(last_block);
        self.advance_round(SyncOutcome::Commit, ledger_state)
    }

    fn advance_round(&mut self, outcome: SyncOutcome, ledger_state: LedgerState) -> Vec<Action> {
        self.ledger_state = Some(ledger_state.clone());
        self.pending_commit = None;

        let mut actions = self.ordering.on_sync_event(outcome, &ledger_state);
        actions.extend(
            self.consensus
                .on_round_start(self.ordering.current_round(), ledger_state),
        );
        actions
    }

    fn on_outcome(&mut self, outcome: ConsensusOutcome) -> Vec<Action> {
        match outcome {
            ConsensusOutcome::Committed { hash, .. } => {
                // Agreement on the empty hash means the cluster saw no
                // proposal; the round moves on without a block.
                if hash.is_empty() {
                    debug!(round = %hash.round, "agreement on nothing");
                    return self.advance_with(SyncOutcome::Nothing);
                }

                if let Some(block) = self.consensus.cached_block(&hash.block_hash) {
                    return vec![Action::ApplyBlock {
                        block: block.clone(),
                    }];
                }

                // We voted differently (or not at all); fetch the winning
                // block from one of its voters.
                match self.consensus.download_source(&hash) {
                    Some(peer) => {
                        self.pending_commit = Some(hash);
                        vec![Action::RequestBlock {
                            peer,
                            block_hash: hash.block_hash,
                        }]
                    }
                    None => {
                        warn!(round = %hash.round, "commit without a reachable voter");
                        self.advance_with(SyncOutcome::Nothing)
                    }
                }
            }
            ConsensusOutcome::Rejected { round } => {
                debug!(%round, "round rejected");
                self.advance_with(SyncOutcome::Reject)
            }
        }
    }

    fn advance_with(&mut self, outcome: SyncOutcome) -> Vec<Action> {
        match self.ledger_state.clone() {
            Some(ledger_state) => self.advance_round(outcome, ledger_state),
            None => {
                warn!("cannot advance round before initialization");
                Vec::new()
            }
        }
    }

    fn on_block_applied(&mut self, block: Arc<Block>, ledger_state: LedgerState) -> Vec<Action> {
        info!(height = block.height().0, hash = %block.hash(), "block applied");
        self.ordering.on_block_applied(&block);

        let mut actions = vec![Action::EmitCommittedBlock {
            block: (*block).clone(),
        }];
        actions.extend(self.advance_round(SyncOutcome::Commit, ledger_state));
        actions
    }

    fn on_block_response(&mut self, block_hash: Hash, block: Option<Block>) -> Vec<Action> {
        let Some(pending) = self.pending_commit else {
            return Vec::new();
        };
        if pending.block_hash != block_hash {
            return Vec::new();
        }

        match block {
            Some(block) if block.hash() == block_hash => {
                self.consensus.cache_block(block.clone());
                vec![Action::ApplyBlock { block }]
            }
            _ => {
                warn!(hash = %block_hash, "block download failed; skipping the round");
                self.advance_with(SyncOutcome::Nothing)
            }
        }
    }
}

impl StateMachine for NodeStateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::ProposalTimer => self.consensus.on_proposal_timer(),

            Event::BatchesReceived { batches } => self.ordering.on_batches_received(batches),

            Event::ProposalRequestReceived { round, request_id } => {
                self.ordering
                    .on_proposal_request(round, request_id, self.now_ms)
            }

            Event::ProposalResponseReceived { round, proposal } => {
                let cleaned = self.ordering.on_proposal_response(round, proposal);
                self.consensus.on_proposal(round, cleaned)
            }

            Event::VotesReceived { votes } => self.consensus.on_votes(votes),

            Event::BlockRequestReceived {
                block_hash,
                request_id,
            } => {
                let block = self.consensus.cached_block(&block_hash).cloned();
                vec![Action::RespondBlock {
                    request_id,
                    block_hash,
                    block,
                }]
            }

            Event::BlockResponseReceived { block_hash, block } => {
                self.on_block_response(block_hash, block)
            }

            Event::ProposalVerified {
                round,
                proposal_hash,
                block,
            } => self.consensus.on_proposal_verified(round, proposal_hash, block),

            Event::OutcomeDetermined { outcome } => self.on_outcome(outcome),

            Event::BlockApplied {
                block,
                ledger_state,
            } => self.on_block_applied(block, ledger_state),

            Event::BlockApplyFailed { round, description } => {
                warn!(%round, %description, "block apply failed");
                self.advance_with(SyncOutcome::Reject)
            }

            Event::SubmitBatch { batch, request_id } => {
                self.ordering.on_submit_batch(batch, request_id)
            }
        }
    }
}
