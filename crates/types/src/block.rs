//! Proposals, blocks, and the ledger state snapshot.

use crate::{BlockHeight, Hash, KeyPair, PeerRecord, PublicKey, Signature, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered list of transactions offered for one consensus round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Height of the block this proposal would become.
    pub height: BlockHeight,
    /// Assembly time, milliseconds since the Unix epoch.
    pub created_ms: u64,
    /// Transactions in ordering-service order.
    pub transactions: Vec<Transaction>,
}

impl Proposal {
    pub fn new(height: BlockHeight, created_ms: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            height,
            created_ms,
            transactions,
        }
    }

    /// Digest over height, time, and the member transaction hashes.
    pub fn hash(&self) -> Hash {
        let mut parts: Vec<u8> = Vec::with_capacity(16 + self.transactions.len() * 32);
        parts.extend_from_slice(&self.height.0.to_le_bytes());
        parts.extend_from_slice(&self.created_ms.to_le_bytes());
        for tx in &self.transactions {
            parts.extend_from_slice(tx.hash().as_bytes());
        }
        Hash::digest(&parts)
    }
}

/// The signed portion of a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockPayload {
    /// Chain position; the genesis block is height 1.
    pub height: BlockHeight,
    /// Hash of the previous block ([`Hash::ZERO`] for genesis).
    pub prev_hash: Hash,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_ms: u64,
    /// Transactions that passed stateful validation, in proposal order.
    pub transactions: Vec<Transaction>,
    /// Hashes of proposal transactions that failed stateful validation.
    pub rejected_hashes: Vec<Hash>,
}

/// A committed (or candidate) block.
pub struct Block {
    payload: BlockPayload,
    signatures: Vec<(PublicKey, Signature)>,
    /// Cached payload hash.
    hash: Hash,
}

impl Block {
    pub fn new(payload: BlockPayload) -> Self {
        let bytes = bincode::serialize(&payload).expect("payload serializes");
        let hash = Hash::digest(&bytes);
        Self {
            payload,
            signatures: Vec::new(),
            hash,
        }
    }

    pub fn with_signatures(payload: BlockPayload, signatures: Vec<(PublicKey, Signature)>) -> Self {
        let mut block = Self::new(payload);
        block.signatures = signatures;
        block
    }

    /// Sign the block hash and append the signature.
    pub fn sign(&mut self, keypair: &KeyPair) {
        let signature = keypair.sign(self.hash.as_bytes());
        self.signatures.push((keypair.public_key(), signature));
    }

    /// The block hash (hash of the canonical payload bytes).
    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn height(&self) -> BlockHeight {
        self.payload.height
    }

    pub fn prev_hash(&self) -> Hash {
        self.payload.prev_hash
    }

    pub fn created_ms(&self) -> u64 {
        self.payload.created_ms
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.payload.transactions
    }

    pub fn rejected_hashes(&self) -> &[Hash] {
        &self.payload.rejected_hashes
    }

    pub fn signatures(&self) -> &[(PublicKey, Signature)] {
        &self.signatures
    }

    pub fn payload(&self) -> &BlockPayload {
        &self.payload
    }
}

impl Clone for Block {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            signatures: self.signatures.clone(),
            hash: self.hash,
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("height", &self.payload.height)
            .field("hash", &self.hash)
            .field("transactions", &self.payload.transactions.len())
            .field("rejected", &self.payload.rejected_hashes.len())
            .finish()
    }
}

impl Serialize for Block {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        (&self.payload, &self.signatures).serialize(ser)
    }
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let (payload, signatures) =
            <(BlockPayload, Vec<(PublicKey, Signature)>)>::deserialize(de)?;
        Ok(Block::with_signatures(payload, signatures))
    }
}

/// Snapshot of the chain tip and the peer set it implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Hash of the top committed block.
    pub top_hash: Hash,
    /// Height of the top committed block.
    pub top_height: BlockHeight,
    /// Current peers, in world-state enumeration order.
    pub peers: Vec<PeerRecord>,
}

impl LedgerState {
    pub fn new(top_hash: Hash, top_height: BlockHeight, peers: Vec<PeerRecord>) -> Self {
        Self {
            top_hash,
            top_height,
            peers,
        }
    }
}
