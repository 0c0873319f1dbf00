//! Consensus gate.
//!
//! Drives one round at a time through the phases
//!
//! ```text
//! Proposing ──proposal verified──▶ Voting ──quorum──▶ Committed
//!     │                              │
//!     └──timer──▶ vote NoProposal ───┴──no quorum possible──▶ Rejected
//! ```
//!
//! Terminal phases are transient: the node advances the round on every
//! outcome and calls [`ConsensusState::on_round_start`] again. The gate
//! never touches storage; candidate blocks come in through
//! `ProposalVerified` and committed blocks are resolved from the result
//! cache or downloaded from a voting peer by the node.

use crate::config::ConsensusConfig;
use crate::vote_storage::VoteStorage;
use ledger_core::{Action, TimerId};
use ledger_types::{
    Block, ConsensusOutcome, Hash, KeyPair, LedgerState, Proposal, PublicKey, Round, VoteMessage,
    YacHash,
};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, instrument, warn};

/// Candidate and downloaded blocks retained for serving and commit lookup.
const RESULT_CACHE_CAPACITY: usize = 8;

/// Phase of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Waiting for the round's proposal.
    Proposing,
    /// Voted; collecting the cluster's votes.
    Voting,
    /// Quorum reached on a hash.
    Committed,
    /// No hash can reach quorum this round.
    Rejected,
}

/// Per-round consensus driver plus vote storage.
pub struct ConsensusState {
    keypair: KeyPair,
    config: ConsensusConfig,
    phase: RoundPhase,
    current_round: Round,
    ledger_state: Option<LedgerState>,
    storage: VoteStorage,
    /// Blocks this node built or fetched, by block hash. Consulted before
    /// downloading a committed block from a voter.
    result_cache: HashMap<Hash, Block>,
    /// Insertion order of the result cache, for eviction.
    cache_order: VecDeque<Hash>,
}

impl ConsensusState {
    pub fn new(keypair: KeyPair, config: ConsensusConfig) -> Self {
        let storage = VoteStorage::new(config.model, config.cleanup_depth);
        Self {
            keypair,
            config,
            phase: RoundPhase::Proposing,
            current_round: Round::default(),
            ledger_state: None,
            storage,
            result_cache: HashMap::new(),
            cache_order: VecDeque::new(),
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn current_round(&self) -> Round {
        self.current_round
    }

    /// The local peer's identity key.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Enter a new round: reset the phase and arm the proposal timer.
    #[instrument(skip(self, ledger_state), fields(round = %round))]
    pub fn on_round_start(&mut self, round: Round, ledger_state: LedgerState) -> Vec<Action> {
        self.phase = RoundPhase::Proposing;
        self.current_round = round;
        self.ledger_state = Some(ledger_state);
        vec![Action::SetTimer {
            id: TimerId::Proposal,
            duration: self.config.proposal_wait,
        }]
    }

    /// The ordering gate delivered the round's proposal (or its absence).
    ///
    /// A present proposal goes out for stateful verification; the vote is
    /// cast when the candidate block comes back. An absent proposal is an
    /// immediate `NoProposal` vote.
    pub fn on_proposal(&mut self, round: Round, proposal: Option<Proposal>) -> Vec<Action> {
        if round != self.current_round || self.phase != RoundPhase::Proposing {
            debug!(%round, phase = ?self.phase, "ignoring proposal outside the proposing phase");
            return Vec::new();
        }

        let (top_height, top_hash) = match &self.ledger_state {
            Some(state) => (state.top_height, state.top_hash),
            None => {
                warn!("no ledger state; cannot process proposal");
                return Vec::new();
            }
        };

        match proposal {
            None => self.vote_no_proposal(),
            Some(proposal) => {
                if proposal.height.0 != top_height.0 + 1 {
                    warn!(
                        height = proposal.height.0,
                        top = top_height.0,
                        "proposal height does not extend the chain"
                    );
                    return self.vote_no_proposal();
                }
                vec![Action::VerifyProposal {
                    round,
                    proposal,
                    prev_hash: top_hash,
                }]
            }
        }
    }

    /// Stateful verification produced the candidate block: vote on it.
    pub fn on_proposal_verified(
        &mut self,
        round: Round,
        proposal_hash: Hash,
        block: Block,
    ) -> Vec<Action> {
        if round != self.current_round || self.phase != RoundPhase::Proposing {
            debug!(%round, "verified proposal arrived too late");
            return Vec::new();
        }

        let block_hash = block.hash();
        self.cache_block(block);
        self.phase = RoundPhase::Voting;

        let vote = VoteMessage::new(
            YacHash::new(round, proposal_hash, block_hash),
            &self.keypair,
        );
        info!(%round, block = %block_hash, "voting");
        vec![
            Action::CancelTimer {
                id: TimerId::Proposal,
            },
            Action::BroadcastVotes { votes: vec![vote] },
        ]
    }

    /// The proposal wait expired without a usable proposal.
    pub fn on_proposal_timer(&mut self) -> Vec<Action> {
        if self.phase != RoundPhase::Proposing {
            return Vec::new();
        }
        info!(round = %self.current_round, "proposal timer expired");
        self.vote_no_proposal()
    }

    /// Votes arrived (from peers or our own loopback).
    pub fn on_votes(&mut self, votes: Vec<VoteMessage>) -> Vec<Action> {
        let Some(cluster_size) = self.ledger_state.as_ref().map(|l| l.peers.len()) else {
            warn!("no ledger state; dropping votes");
            return Vec::new();
        };

        let mut actions = Vec::new();
        for vote in votes {
            if !vote.verify() {
                warn!(voter = %vote.voter, "invalid vote signature");
                continue;
            }
            if let Some(outcome) = self.storage.insert(vote, cluster_size) {
                if outcome.round() == self.current_round {
                    self.phase = match &outcome {
                        ConsensusOutcome::Committed { .. } => RoundPhase::Committed,
                        ConsensusOutcome::Rejected { .. } => RoundPhase::Rejected,
                    };
                }
                actions.push(Action::EnqueueInternal {
                    event: ledger_core::Event::OutcomeDetermined { outcome },
                });
            }
        }
        actions
    }

    /// Look up a block by hash in the result cache.
    pub fn cached_block(&self, block_hash: &Hash) -> Option<&Block> {
        self.result_cache.get(block_hash)
    }

    /// Remember a block (candidate or fetched), evicting the oldest entry
    /// once the cache is full.
    pub fn cache_block(&mut self, block: Block) {
        let hash = block.hash();
        if self.result_cache.insert(hash, block).is_none() {
            self.cache_order.push_back(hash);
        }
        while self.cache_order.len() > RESULT_CACHE_CAPACITY {
            if let Some(evicted) = self.cache_order.pop_front() {
                self.result_cache.remove(&evicted);
            }
        }
    }

    /// A peer to download the committed block from: any voter for the
    /// winning hash that is not ourselves.
    pub fn download_source(&self, hash: &YacHash) -> Option<PublicKey> {
        let own = self.keypair.public_key();
        self.storage
            .votes_for(hash)
            .into_iter()
            .map(|vote| vote.voter)
            .find(|voter| *voter != own)
    }

    fn vote_no_proposal(&mut self) -> Vec<Action> {
        self.phase = RoundPhase::Voting;
        let vote = VoteMessage::new(YacHash::no_proposal(self.current_round), &self.keypair);
        vec![
            Action::CancelTimer {
                id: TimerId::Proposal,
            },
            Action::BroadcastVotes { votes: vec![vote] },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::test_utils::{test_keypair, test_peer};
    use ledger_types::{BlockHeight, BlockPayload};

    fn ledger_state(n: u8) -> LedgerState {
        LedgerState::new(
            Hash::digest(b"top"),
            BlockHeight(1),
            (0..n).map(test_peer).collect(),
        )
    }

    fn gate() -> ConsensusState {
        ConsensusState::new(test_keypair(0), ConsensusConfig::default())
    }

    fn candidate_block() -> Block {
        Block::new(BlockPayload {
            height: BlockHeight(2),
            prev_hash: Hash::digest(b"top"),
            created_ms: 5,
            transactions: vec![],
            rejected_hashes: vec![],
        })
    }

    fn vote_for(seed: u8, hash: YacHash) -> VoteMessage {
        VoteMessage::new(hash, &test_keypair(seed))
    }

    #[test]
    fn round_start_arms_the_proposal_timer() {
        let mut gate = gate();
        let actions = gate.on_round_start(Round::new(1, 0), ledger_state(4));
        assert!(matches!(
            actions[0],
            Action::SetTimer {
                id: TimerId::Proposal,
                ..
            }
        ));
        assert_eq!(gate.phase(), RoundPhase::Proposing);
    }

    #[test]
    fn proposal_flows_through_verification_to_a_vote() {
        let mut gate = gate();
        let round = Round::new(1, 0);
        gate.on_round_start(round, ledger_state(4));

        let proposal = Proposal::new(BlockHeight(2), 5, vec![]);
        let proposal_hash = proposal.hash();
        let actions = gate.on_proposal(round, Some(proposal));
        assert!(matches!(actions[0], Action::VerifyProposal { .. }));
        assert_eq!(gate.phase(), RoundPhase::Proposing);

        let block = candidate_block();
        let block_hash = block.hash();
        let actions = gate.on_proposal_verified(round, proposal_hash, block);
        assert_eq!(gate.phase(), RoundPhase::Voting);

        let vote = actions.iter().find_map(|a| match a {
            Action::BroadcastVotes { votes } => Some(votes[0].clone()),
            _ => None,
        });
        let vote = vote.expect("vote broadcast");
        assert_eq!(vote.hash, YacHash::new(round, proposal_hash, block_hash));
        assert!(vote.verify());
        assert!(gate.cached_block(&block_hash).is_some());
    }

    #[test]
    fn timer_expiry_votes_no_proposal() {
        let mut gate = gate();
        let round = Round::new(1, 0);
        gate.on_round_start(round, ledger_state(4));

        let actions = gate.on_proposal_timer();
        let vote = actions.iter().find_map(|a| match a {
            Action::BroadcastVotes { votes } => Some(votes[0].clone()),
            _ => None,
        });
        assert!(vote.expect("vote broadcast").hash.is_empty());
        assert_eq!(gate.phase(), RoundPhase::Voting);

        // A late proposal no longer changes anything.
        assert!(gate
            .on_proposal(round, Some(Proposal::new(BlockHeight(2), 5, vec![])))
            .is_empty());
    }

    #[test]
    fn absent_proposal_votes_no_proposal_immediately() {
        let mut gate = gate();
        let round = Round::new(1, 0);
        gate.on_round_start(round, ledger_state(4));

        let actions = gate.on_proposal(round, None);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::BroadcastVotes { .. })));
        assert_eq!(gate.phase(), RoundPhase::Voting);
    }

    #[test]
    fn mismatched_height_is_treated_as_no_proposal() {
        let mut gate = gate();
        let round = Round::new(1, 0);
        gate.on_round_start(round, ledger_state(4));

        let actions = gate.on_proposal(round, Some(Proposal::new(BlockHeight(9), 5, vec![])));
        let vote = actions.iter().find_map(|a| match a {
            Action::BroadcastVotes { votes } => Some(votes[0].clone()),
            _ => None,
        });
        assert!(vote.expect("vote broadcast").hash.is_empty());
    }

    #[test]
    fn quorum_commits_the_round() {
        let mut gate = gate();
        let round = Round::new(1, 0);
        gate.on_round_start(round, ledger_state(4));

        let hash = YacHash::new(round, Hash::digest(b"p"), Hash::digest(b"b"));
        let votes: Vec<_> = (1..=3).map(|seed| vote_for(seed, hash)).collect();

        let mut outcome_events = Vec::new();
        for vote in votes {
            outcome_events.extend(gate.on_votes(vec![vote]));
        }

        assert_eq!(gate.phase(), RoundPhase::Committed);
        assert_eq!(outcome_events.len(), 1);
        assert!(matches!(
            &outcome_events[0],
            Action::EnqueueInternal {
                event: ledger_core::Event::OutcomeDetermined {
                    outcome: ConsensusOutcome::Committed { .. }
                }
            }
        ));
    }

    #[test]
    fn forged_votes_are_dropped() {
        let mut gate = gate();
        let round = Round::new(1, 0);
        gate.on_round_start(round, ledger_state(4));

        let hash = YacHash::new(round, Hash::digest(b"p"), Hash::digest(b"b"));
        let mut forged = vote_for(1, hash);
        forged.voter = test_keypair(9).public_key();

        assert!(gate.on_votes(vec![forged]).is_empty());
    }

    #[test]
    fn download_source_skips_self() {
        let mut gate = gate();
        let round = Round::new(1, 0);
        gate.on_round_start(round, ledger_state(4));

        let hash = YacHash::new(round, Hash::digest(b"p"), Hash::digest(b"b"));
        // Own vote (seed 0 is the gate's key) plus two peers.
        gate.on_votes(vec![
            VoteMessage::new(hash, &test_keypair(0)),
            vote_for(1, hash),
            vote_for(2, hash),
        ]);

        let source = gate.download_source(&hash).expect("a foreign voter");
        assert_ne!(source, gate.public_key());
    }
}
