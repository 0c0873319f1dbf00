//! Per-round peer routing.
//!
//! For every round three peers matter: the **issuer** serving the round's
//! proposal, and the **reject** and **commit consumers** that must already
//! hold the batches for the two possible next rounds:
//!
//! ```text
//!    0 1         0 1         0 1
//!  0 o .       0 o x       0 o .
//!  1 . .       1 . .       1 x .
//! Issuer      Reject      Commit
//! ```
//!
//! (`o` - the new round, `x` - the round after it.)
//!
//! All three are picked from seeded permutations of the current peer list:
//! the permutation seeded by the *previous* block hash covers rounds at the
//! current height, the one seeded by the *current* block hash covers the
//! next height. Every honest node computes identical routing from the same
//! ledger state.

use ledger_types::{
    generate_permutation, make_seeded_prng, Hash, PeerRecord, Round, SyncOutcome,
};

/// The peers a node talks to for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPeers {
    /// Serves `RequestProposal` for the round.
    pub issuer: PeerRecord,
    /// Receives batches for the round after a reject.
    pub reject_consumer: PeerRecord,
    /// Receives batches for the round after a commit.
    pub commit_consumer: PeerRecord,
}

impl CurrentPeers {
    /// The distinct peers in routing order (issuer, reject, commit).
    pub fn distinct(&self) -> Vec<&PeerRecord> {
        let mut out: Vec<&PeerRecord> = vec![&self.issuer];
        for peer in [&self.reject_consumer, &self.commit_consumer] {
            if !out.iter().any(|p| p.pubkey == peer.pubkey) {
                out.push(peer);
            }
        }
        out
    }
}

/// Advance the round for a synchronization outcome and pick the new round's
/// peers.
///
/// `peers` must be non-empty and in world-state enumeration order;
/// `previous_hash` and `current_hash` are the hashes of the two newest
/// committed blocks.
pub fn route_round(
    outcome: SyncOutcome,
    current_round: Round,
    peers: &[PeerRecord],
    previous_hash: Hash,
    current_hash: Hash,
) -> (Round, CurrentPeers) {
    let next = current_round.advanced_by(outcome);
    (next, select_peers(next, peers, previous_hash, current_hash))
}

/// Pick the three ordering peers for an already-advanced round.
pub fn select_peers(
    next: Round,
    peers: &[PeerRecord],
    previous_hash: Hash,
    current_hash: Hash,
) -> CurrentPeers {
    assert!(!peers.is_empty(), "peer list may never be empty");

    let current_perm = permutation_for(previous_hash, peers.len());
    let next_perm = permutation_for(current_hash, peers.len());

    let pick = |perm: &[usize], reject_round: u32| -> PeerRecord {
        peers[perm[reject_round as usize % perm.len()]].clone()
    };

    CurrentPeers {
        issuer: pick(&current_perm, next.reject_round),
        reject_consumer: pick(&current_perm, next.next_reject_round().reject_round),
        commit_consumer: pick(&next_perm, next.next_commit_round().reject_round),
    }
}

fn permutation_for(hash: Hash, size: usize) -> Vec<usize> {
    let mut prng = make_seeded_prng(hash.as_bytes());
    generate_permutation(&mut prng, size)
}
