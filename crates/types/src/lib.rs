//! Foundational types for the ledger.
//!
//! This crate provides the types used throughout the node:
//!
//! - **Primitives**: SHA3-256 [`Hash`], Ed25519 keys and signatures
//! - **Identifiers**: [`AccountId`], [`AssetId`], [`DomainId`], [`RoleName`]
//! - **World-state values**: [`Amount`], permission sets
//! - **Protocol objects**: [`Command`], [`Transaction`], [`Batch`],
//!   [`Proposal`], [`Block`], [`Round`], [`VoteMessage`]
//! - **Determinism**: the protocol PRNG and peer permutation generator
//!
//! # Design Philosophy
//!
//! This crate is self-contained and does not depend on any other workspace
//! crate, making it the foundation layer. Everything here is passive data;
//! behaviour lives in the state-machine crates.

mod amount;
mod block;
mod command;
mod crypto;
mod hash;
mod identifiers;
mod permissions;
mod permutation;
mod round;
mod transaction;
mod vote;

pub use amount::{Amount, MAX_PRECISION};
pub use block::{Block, BlockPayload, LedgerState, Proposal};
pub use command::{Command, PeerRecord};
pub use crypto::{KeyPair, PublicKey, Signature};
pub use hash::{Hash, HexError};
pub use identifiers::{AccountId, AssetId, BlockHeight, DomainId, RoleName};
pub use permissions::{
    check, check_domain, check_grantable, permission_for, GrantablePermission,
    GrantablePermissionSet, RolePermission, RolePermissionSet,
};
pub use permutation::{generate_permutation, make_seeded_prng, Mt19937_64, SeedValue, Seeder};
pub use round::{Round, SyncOutcome, FIRST_REJECT_ROUND};
pub use transaction::{
    Batch, BatchSemantics, Transaction, TransactionPayload, TransactionSignature,
};
pub use vote::{ConsensusOutcome, VoteMessage, YacHash};

/// Test helpers shared by downstream crates.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// A deterministic keypair derived from a single seed byte.
    pub fn test_keypair(seed: u8) -> KeyPair {
        KeyPair::from_seed(&[seed; 32])
    }

    /// A peer record with a deterministic key and a synthetic address.
    pub fn test_peer(seed: u8) -> PeerRecord {
        PeerRecord {
            pubkey: test_keypair(seed).public_key(),
            address: format!("127.0.0.1:{}", 11000 + seed as u16),
            tls_certificate: None,
        }
    }

    /// A minimal signed transaction whose only content is a detail write.
    ///
    /// Distinct `nonce` values produce distinct hashes.
    pub fn test_transaction(creator: &str, nonce: u64) -> Transaction {
        let keypair = test_keypair((nonce % 251) as u8);
        let mut tx = Transaction::new(TransactionPayload {
            creator_account_id: AccountId::parse(creator),
            commands: vec![Command::SetAccountDetail {
                account_id: AccountId::parse(creator).expect("creator id parses"),
                key: "nonce".into(),
                value: nonce.to_string(),
            }],
            quorum: 1,
            created_ms: nonce,
        });
        tx.sign(&keypair);
        tx
    }

    /// A single-transaction batch.
    pub fn test_batch(creator: &str, nonce: u64) -> Batch {
        Batch::single(test_transaction(creator, nonce))
    }
}
