//! Consensus votes.

use crate::{Hash, KeyPair, PublicKey, Round, Signature};
use serde::{Deserialize, Serialize};

/// The value a peer votes on in a round: the proposal hash and the hash of
/// the block built from it. An all-zero pair is the `NoProposal` vote cast
/// when the proposal timer expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YacHash {
    pub round: Round,
    pub proposal_hash: Hash,
    pub block_hash: Hash,
}

impl YacHash {
    pub fn new(round: Round, proposal_hash: Hash, block_hash: Hash) -> Self {
        Self {
            round,
            proposal_hash,
            block_hash,
        }
    }

    /// The vote cast when no proposal arrived in time.
    pub fn no_proposal(round: Round) -> Self {
        Self {
            round,
            proposal_hash: Hash::ZERO,
            block_hash: Hash::ZERO,
        }
    }

    /// Whether this is the empty (`NoProposal`) vote.
    pub fn is_empty(&self) -> bool {
        self.proposal_hash == Hash::ZERO && self.block_hash == Hash::ZERO
    }

    /// Canonical bytes signed by voters.
    pub fn signing_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("yac hash serializes")
    }
}

/// A signed vote on a [`YacHash`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    pub hash: YacHash,
    pub voter: PublicKey,
    pub signature: Signature,
}

impl VoteMessage {
    /// Sign a vote with the local keypair.
    pub fn new(hash: YacHash, keypair: &KeyPair) -> Self {
        let signature = keypair.sign(&hash.signing_bytes());
        Self {
            hash,
            voter: keypair.public_key(),
            signature,
        }
    }

    /// Verify the vote signature against the claimed voter key.
    pub fn verify(&self) -> bool {
        self.voter.verify(&self.hash.signing_bytes(), &self.signature)
    }
}

/// Terminal result of vote accumulation for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusOutcome {
    /// A supermajority agreed on one hash. Carries the agreeing votes so the
    /// block can be fetched from any of the voters.
    Committed {
        hash: YacHash,
        votes: Vec<VoteMessage>,
    },
    /// No hash can reach a supermajority in this round.
    Rejected { round: Round },
}

impl ConsensusOutcome {
    pub fn round(&self) -> Round {
        match self {
            ConsensusOutcome::Committed { hash, .. } => hash.round,
            ConsensusOutcome::Rejected { round } => *round,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_signature_verifies() {
        let keypair = KeyPair::from_seed(&[11; 32]);
        let hash = YacHash::new(Round::new(5, 0), Hash::digest(b"p"), Hash::digest(b"b"));

        let vote = VoteMessage::new(hash, &keypair);
        assert!(vote.verify());
    }

    #[test]
    fn tampered_vote_fails_verification() {
        let keypair = KeyPair::from_seed(&[11; 32]);
        let hash = YacHash::new(Round::new(5, 0), Hash::digest(b"p"), Hash::digest(b"b"));

        let mut vote = VoteMessage::new(hash, &keypair);
        vote.hash.block_hash = Hash::digest(b"forged");
        assert!(!vote.verify());
    }

    #[test]
    fn no_proposal_vote_is_empty() {
        let hash = YacHash::no_proposal(Round::new(2, 1));
        assert!(hash.is_empty());
        assert!(!YacHash::new(Round::new(2, 1), Hash::digest(b"p"), Hash::ZERO).is_empty());
    }
}
