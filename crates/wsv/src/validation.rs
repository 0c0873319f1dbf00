//! Stateful proposal verification.
//!
//! Before a node votes on a proposal it speculatively applies every
//! transaction against the current world state. Transactions that fail -
//! bad signatures, missing quorum, or any command error - land in the
//! block's rejected-hash list instead of aborting the round, so a poisoned
//! batch is flushed out of the network by the very block that refuses it.

use crate::executor::CommandExecutor;
use crate::storage::KvBackend;
use ledger_types::{Block, BlockPayload, Hash, Proposal};
use tracing::debug;

/// Build the candidate block for a proposal.
///
/// Applies each transaction under validation on a throwaway cursor, keeping
/// the ones that succeed and recording the hashes of the ones that fail.
/// The world state is left untouched.
pub fn verify_proposal(backend: &dyn KvBackend, proposal: &Proposal, prev_hash: Hash) -> Block {
    let mut executor = CommandExecutor::new(backend);
    let mut transactions = Vec::with_capacity(proposal.transactions.len());
    let mut rejected_hashes = Vec::new();

    for tx in &proposal.transactions {
        if !tx.meets_quorum() {
            debug!(tx_hash = %tx.hash(), "rejected: below signature quorum");
            rejected_hashes.push(tx.hash());
            continue;
        }
        match executor.apply_transaction(tx, true) {
            Ok(()) => transactions.push(tx.clone()),
            Err(error) => {
                debug!(tx_hash = %tx.hash(), %error, "rejected by stateful verification");
                rejected_hashes.push(tx.hash());
            }
        }
    }
    executor.rollback();

    Block::new(BlockPayload {
        height: proposal.height,
        prev_hash,
        created_ms: proposal.created_ms,
        transactions,
        rejected_hashes,
    })
}
