//! Content hashes.
//!
//! All protocol hashes are SHA3-256 over canonical payload bytes.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

/// A 32-byte SHA3-256 hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash, used as the previous-hash of the genesis block.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Hash arbitrary bytes with SHA3-256.
    pub fn digest(bytes: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(bytes);
        Hash(hasher.finalize().into())
    }

    /// Raw bytes of the hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        let bytes = hex::decode(s).map_err(|_| HexError::InvalidHex)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| HexError::InvalidLength)?;
        Ok(Hash(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}..)", &self.to_hex()[..16])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Errors parsing a hash from hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    /// Input was not valid hex.
    #[error("invalid hex string")]
    InvalidHex,
    /// Input decoded to the wrong number of bytes.
    #[error("expected 32 bytes")]
    InvalidLength,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable() {
        let a = Hash::digest(b"hello");
        let b = Hash::digest(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, Hash::digest(b"world"));
    }

    #[test]
    fn hex_round_trip() {
        let h = Hash::digest(b"round trip");
        assert_eq!(Hash::from_hex(&h.to_hex()).unwrap(), h);
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert_eq!(Hash::from_hex("zz"), Err(HexError::InvalidHex));
        assert_eq!(Hash::from_hex("abcd"), Err(HexError::InvalidLength));
    }
}
