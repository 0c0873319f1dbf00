//! Transactions and multi-signature batches.

use crate::{AccountId, Command, Hash, KeyPair, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The signed portion of a transaction. The payload hash is the transaction
/// hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    /// Creator account. `None` only in genesis transactions, which are
    /// attributed to the reserved writer id `genesis`.
    pub creator_account_id: Option<AccountId>,
    /// Commands applied in declared order.
    pub commands: Vec<Command>,
    /// Minimum distinct signatures required to authorize this transaction.
    pub quorum: u32,
    /// Client-side creation time, milliseconds since the Unix epoch.
    pub created_ms: u64,
}

/// A signature over the transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub pubkey: PublicKey,
    pub signature: Signature,
}

/// A signed transaction.
pub struct Transaction {
    payload: TransactionPayload,
    signatures: Vec<TransactionSignature>,
    /// Cached payload hash (computed at construction).
    hash: Hash,
}

impl Transaction {
    /// Create an unsigned transaction.
    pub fn new(payload: TransactionPayload) -> Self {
        let bytes = bincode::serialize(&payload).expect("payload serializes");
        let hash = Hash::digest(&bytes);
        Self {
            payload,
            signatures: Vec::new(),
            hash,
        }
    }

    /// Reassemble a transaction from its parts (wire decode path).
    pub fn with_signatures(
        payload: TransactionPayload,
        signatures: Vec<TransactionSignature>,
    ) -> Self {
        let mut tx = Self::new(payload);
        tx.signatures = signatures;
        tx
    }

    /// Sign the payload hash and append the signature.
    pub fn sign(&mut self, keypair: &KeyPair) {
        let signature = keypair.sign(self.hash.as_bytes());
        self.signatures.push(TransactionSignature {
            pubkey: keypair.public_key(),
            signature,
        });
    }

    /// The transaction hash (hash of the canonical payload bytes).
    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn payload(&self) -> &TransactionPayload {
        &self.payload
    }

    pub fn signatures(&self) -> &[TransactionSignature] {
        &self.signatures
    }

    /// Count distinct signatories with valid signatures over the hash.
    pub fn valid_signature_count(&self) -> usize {
        let mut seen = std::collections::BTreeSet::new();
        self.signatures
            .iter()
            .filter(|s| s.pubkey.verify(self.hash.as_bytes(), &s.signature) && seen.insert(s.pubkey))
            .count()
    }

    /// Whether the collected signatures satisfy the declared quorum.
    pub fn meets_quorum(&self) -> bool {
        self.valid_signature_count() >= self.payload.quorum as usize
    }
}

impl Clone for Transaction {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            signatures: self.signatures.clone(),
            hash: self.hash,
        }
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.signatures == other.signatures
    }
}

impl Eq for Transaction {}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("hash", &self.hash)
            .field("creator", &self.payload.creator_account_id)
            .field("commands", &self.payload.commands.len())
            .field("signatures", &self.signatures.len())
            .finish()
    }
}

impl Serialize for Transaction {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        (&self.payload, &self.signatures).serialize(ser)
    }
}

impl<'de> Deserialize<'de> for Transaction {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let (payload, signatures) =
            <(TransactionPayload, Vec<TransactionSignature>)>::deserialize(de)?;
        Ok(Transaction::with_signatures(payload, signatures))
    }
}

/// Commit semantics of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchSemantics {
    /// All transactions commit or none do.
    Atomic,
    /// Transactions commit independently, in order.
    OrderedSequence,
}

/// An ordered group of transactions sharing commit semantics.
///
/// The batch hash is the digest of the member transaction hashes in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    transactions: Vec<Transaction>,
    semantics: BatchSemantics,
}

impl Batch {
    /// Build a batch. Empty batches are not valid.
    pub fn new(transactions: Vec<Transaction>, semantics: BatchSemantics) -> Option<Self> {
        if transactions.is_empty() {
            return None;
        }
        Some(Self {
            transactions,
            semantics,
        })
    }

    /// A single-transaction ordered batch.
    pub fn single(tx: Transaction) -> Self {
        Self {
            transactions: vec![tx],
            semantics: BatchSemantics::OrderedSequence,
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }

    pub fn semantics(&self) -> BatchSemantics {
        self.semantics
    }

    /// Digest of the concatenated member transaction hashes.
    pub fn hash(&self) -> Hash {
        let mut bytes = Vec::with_capacity(self.transactions.len() * 32);
        for tx in &self.transactions {
            bytes.extend_from_slice(tx.hash().as_bytes());
        }
        Hash::digest(&bytes)
    }
}
