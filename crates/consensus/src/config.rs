//! Consensus configuration.

use crate::supermajority::ConsistencyModel;
use std::time::Duration;

/// Tunables for the consensus gate.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Fault model deciding the vote threshold.
    pub model: ConsistencyModel,

    /// How long to wait for a round's proposal before voting `NoProposal`.
    pub proposal_wait: Duration,

    /// Terminal rounds retained in vote storage before cleanup.
    pub cleanup_depth: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            model: ConsistencyModel::Bft,
            proposal_wait: Duration::from_secs(3),
            cleanup_depth: 4,
        }
    }
}
