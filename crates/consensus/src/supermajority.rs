//! Supermajority arithmetic.
//!
//! The vote threshold depends on the fault model the cluster is deployed
//! under: crash faults need a simple majority, Byzantine faults need
//! `⌈(2n+1)/3⌉` votes so that any two quorums intersect in an honest peer.

use serde::{Deserialize, Serialize};

/// Fault model the cluster tolerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConsistencyModel {
    /// Crash fault tolerance: majority quorum.
    Cft,
    /// Byzantine fault tolerance: tolerates up to ⌊(n-1)/3⌋ malicious peers.
    #[default]
    Bft,
}

impl ConsistencyModel {
    /// Votes required for a supermajority in a cluster of `n` peers.
    pub fn required(&self, n: usize) -> usize {
        match self {
            ConsistencyModel::Cft => n / 2 + 1,
            ConsistencyModel::Bft => (2 * n + 1).div_ceil(3),
        }
    }

    /// Whether `votes` agreeing votes out of `n` peers reach a supermajority.
    pub fn has_supermajority(&self, votes: usize, n: usize) -> bool {
        votes >= self.required(n)
    }

    /// Whether some hash can still reach a supermajority given the current
    /// best tally and the number of peers yet to vote.
    pub fn can_still_commit(&self, best_tally: usize, voted: usize, n: usize) -> bool {
        best_tally + n.saturating_sub(voted) >= self.required(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bft_thresholds() {
        assert_eq!(ConsistencyModel::Bft.required(1), 1);
        assert_eq!(ConsistencyModel::Bft.required(4), 3);
        assert_eq!(ConsistencyModel::Bft.required(5), 4);
        assert_eq!(ConsistencyModel::Bft.required(6), 5);
        assert_eq!(ConsistencyModel::Bft.required(7), 5);
    }

    #[test]
    fn cft_thresholds() {
        assert_eq!(ConsistencyModel::Cft.required(1), 1);
        assert_eq!(ConsistencyModel::Cft.required(4), 3);
        assert_eq!(ConsistencyModel::Cft.required(5), 3);
        assert_eq!(ConsistencyModel::Cft.required(7), 4);
    }

    #[test]
    fn reject_detection() {
        // 4 peers, BFT: threshold 3. Two conflicting pairs of votes can
        // never converge.
        let model = ConsistencyModel::Bft;
        assert!(model.can_still_commit(2, 2, 4));
        assert!(!model.can_still_commit(1, 3, 4));
        assert!(!model.can_still_commit(2, 4, 4));
    }
}
