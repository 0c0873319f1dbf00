//! Node configuration.

use ledger_consensus::ConsensusConfig;
use ledger_ordering::OrderingConfig;

/// Configuration for a complete node.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub ordering: OrderingConfig,
    pub consensus: ConsensusConfig,
}
