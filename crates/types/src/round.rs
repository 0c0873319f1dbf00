//! Consensus rounds.
//!
//! A round is the pair `(block_round, reject_round)`. `block_round` tracks
//! the committed chain height; `reject_round` counts failed attempts at the
//! current height. Commit advances `block_round` and resets `reject_round`;
//! reject (or an empty round) advances `reject_round` only.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reject round assigned to the first attempt after a commit.
pub const FIRST_REJECT_ROUND: u32 = 0;

/// A consensus attempt identifier.
///
/// Orders lexicographically by `(block_round, reject_round)`, which is the
/// order rounds occur in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Round {
    /// Height of the last committed block.
    pub block_round: u64,
    /// Attempt number at this height.
    pub reject_round: u32,
}

impl Round {
    pub fn new(block_round: u64, reject_round: u32) -> Self {
        Self {
            block_round,
            reject_round,
        }
    }

    /// The round entered after a commit at this round.
    pub fn next_commit_round(&self) -> Round {
        Round::new(self.block_round + 1, FIRST_REJECT_ROUND)
    }

    /// The round entered after a reject (or empty outcome) at this round.
    pub fn next_reject_round(&self) -> Round {
        Round::new(self.block_round, self.reject_round + 1)
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.block_round, self.reject_round)
    }
}

/// How the previous round was resolved; drives round advancement and peer
/// routing for the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOutcome {
    /// A block was committed.
    Commit,
    /// Consensus rejected the round.
    Reject,
    /// The round produced nothing (no proposal, no quorum).
    Nothing,
}

impl Round {
    /// The round following this one under the given outcome.
    pub fn advanced_by(&self, outcome: SyncOutcome) -> Round {
        match outcome {
            SyncOutcome::Commit => self.next_commit_round(),
            SyncOutcome::Reject | SyncOutcome::Nothing => self.next_reject_round(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_resets_reject_round() {
        let round = Round::new(5, 3);
        assert_eq!(round.next_commit_round(), Round::new(6, 0));
        assert_eq!(round.next_reject_round(), Round::new(5, 4));
    }

    #[test]
    fn rounds_order_lexicographically() {
        assert!(Round::new(4, 9) < Round::new(5, 0));
        assert!(Round::new(5, 0) < Round::new(5, 1));
    }
}
