//! Per-round vote accumulation.
//!
//! Stores one vote per (peer, round) and tallies votes per hash. A round
//! resolves to **Committed** once some hash reaches the supermajority, or
//! **Rejected** once no hash can reach it with the votes still outstanding.
//! The outcome of a round is a pure function of its vote set: feeding the
//! same votes in any order yields the same terminal result.
//!
//! Terminal rounds are kept in a bounded buffer; once a round falls out of
//! the buffer its votes are dropped and stale votes for anything at or
//! below it are ignored.

use crate::supermajority::ConsistencyModel;
use ledger_types::{ConsensusOutcome, PublicKey, Round, VoteMessage, YacHash};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info};

/// Votes and tallies for one round.
#[derive(Debug, Default)]
struct RoundVotes {
    by_voter: HashMap<PublicKey, YacHash>,
    tallies: BTreeMap<YacHash, Vec<VoteMessage>>,
    decided: bool,
}

/// Bounded, per-round vote store with quorum detection.
pub struct VoteStorage {
    model: ConsistencyModel,
    /// Terminal rounds retained before cleanup.
    buffer_depth: usize,
    rounds: BTreeMap<Round, RoundVotes>,
    terminal: VecDeque<Round>,
    /// Rounds at or below this are cleaned; their votes are stale.
    floor: Option<Round>,
}

impl VoteStorage {
    pub fn new(model: ConsistencyModel, buffer_depth: usize) -> Self {
        Self {
            model,
            buffer_depth,
            rounds: BTreeMap::new(),
            terminal: VecDeque::new(),
            floor: None,
        }
    }

    /// Insert one vote. Returns the round's outcome the moment it becomes
    /// terminal; duplicates, stale votes, and votes for already-decided
    /// rounds return `None`.
    pub fn insert(&mut self, vote: VoteMessage, cluster_size: usize) -> Option<ConsensusOutcome> {
        let round = vote.hash.round;
        if self.floor.is_some_and(|floor| round <= floor) {
            debug!(%round, "stale vote dropped");
            return None;
        }

        let entry = self.rounds.entry(round).or_default();
        if entry.decided {
            return None;
        }
        // One vote per peer per round; the first one wins.
        if entry.by_voter.contains_key(&vote.voter) {
            debug!(%round, voter = %vote.voter, "duplicate vote dropped");
            return None;
        }
        entry.by_voter.insert(vote.voter, vote.hash);
        entry.tallies.entry(vote.hash).or_default().push(vote);

        let outcome = self.evaluate(round, cluster_size);
        if outcome.is_some() {
            self.mark_terminal(round);
        }
        outcome
    }

    /// The votes supporting a hash in a round (for serving block downloads).
    pub fn votes_for(&self, hash: &YacHash) -> Vec<VoteMessage> {
        self.rounds
            .get(&hash.round)
            .and_then(|entry| entry.tallies.get(hash))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of live (not yet cleaned) rounds, for introspection.
    pub fn live_rounds(&self) -> usize {
        self.rounds.len()
    }

    fn evaluate(&self, round: Round, cluster_size: usize) -> Option<ConsensusOutcome> {
        let entry = self.rounds.get(&round)?;

        // Best tally; ties prefer the lexicographically smallest hash.
        let (best_hash, best_votes) = entry
            .tallies
            .iter()
            .max_by(|a, b| a.1.len().cmp(&b.1.len()).then_with(|| b.0.cmp(a.0)))?;

        if self.model.has_supermajority(best_votes.len(), cluster_size) {
            info!(%round, hash = %best_hash.block_hash, votes = best_votes.len(), "committed");
            return Some(ConsensusOutcome::Committed {
                hash: *best_hash,
                votes: best_votes.clone(),
            });
        }

        let voted = entry.by_voter.len();
        if !self
            .model
            .can_still_commit(best_votes.len(), voted, cluster_size)
        {
            info!(%round, voted, "rejected: no hash can reach quorum");
            return Some(ConsensusOutcome::Rejected { round });
        }

        None
    }

    fn mark_terminal(&mut self, round: Round) {
        if let Some(entry) = self.rounds.get_mut(&round) {
            entry.decided = true;
        }
        self.terminal.push_back(round);

        while self.terminal.len() > self.buffer_depth {
            let expired = self.terminal.pop_front().expect("non-empty");
            // Drop the expired round and everything older.
            let keep = self.rounds.split_off(&expired.next_reject_round());
            self.rounds = keep;
            self.floor = Some(self.floor.map_or(expired, |f| f.max(expired)));
        }
    }
}
