//! Ordering configuration.

use std::time::Duration;

/// Tunables for the ordering subsystem.
#[derive(Debug, Clone)]
pub struct OrderingConfig {
    /// Maximum transactions packed into one proposal.
    pub transaction_limit: usize,

    /// Proposal rounds retained behind the current round.
    pub proposal_window: usize,

    /// Upper bound on a `RequestProposal` round trip; on expiry the gate
    /// proceeds with an empty proposal event.
    pub proposal_request_timeout: Duration,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            transaction_limit: 2048,
            proposal_window: 3,
            proposal_request_timeout: Duration::from_secs(2),
        }
    }
}
