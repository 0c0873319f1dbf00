//! Read-only views over the world state.
//!
//! Committed-state reads used by routing and the RPC surface. These read the
//! backend directly and never observe uncommitted cursor state.

use crate::cursor::Cursor;
use crate::error::StorageError;
use crate::keys;
use crate::storage::{KvBackend, ScanControl};
use ledger_types::{
    AccountId, AssetId, BlockHeight, Hash, LedgerState, PeerRecord, PublicKey,
};

/// Read-only world-state query handle.
pub struct WsvQuery<'a> {
    backend: &'a dyn KvBackend,
}

impl<'a> WsvQuery<'a> {
    pub fn new(backend: &'a dyn KvBackend) -> Self {
        Self { backend }
    }

    /// Current peers in enumeration (key) order.
    pub fn peers(&self) -> Result<Vec<PeerRecord>, StorageError> {
        let cursor = Cursor::begin(self.backend);
        let mut entries: Vec<(String, String)> = Vec::new();
        cursor.enumerate(keys::PEER_ADDRESS_PREFIX, |key, value| {
            entries.push((
                key[keys::PEER_ADDRESS_PREFIX.len()..].to_string(),
                String::from_utf8_lossy(value).into_owned(),
            ));
            ScanControl::Continue
        })?;

        let mut peers = Vec::with_capacity(entries.len());
        for (pubkey_hex, address) in entries {
            let pubkey = parse_pubkey(&pubkey_hex)?;
            let tls_certificate = cursor.get_str(&keys::peer_tls(&pubkey))?;
            peers.push(PeerRecord {
                pubkey,
                address,
                tls_certificate,
            });
        }
        Ok(peers)
    }

    /// Chain tip and peer set, or `None` before genesis is applied.
    pub fn ledger_state(&self) -> Result<Option<LedgerState>, StorageError> {
        let cursor = Cursor::begin(self.backend);
        let Some(height) = cursor.get_u64(keys::WSV_HEIGHT)? else {
            return Ok(None);
        };
        let top_hash = match cursor.get_str(keys::WSV_TOP_HASH)? {
            Some(hex) => Hash::from_hex(&hex).map_err(|_| StorageError::CorruptValue {
                key: keys::WSV_TOP_HASH.into(),
                reason: "expected hash hex".into(),
            })?,
            None => {
                return Err(StorageError::CorruptValue {
                    key: keys::WSV_TOP_HASH.into(),
                    reason: "missing top hash".into(),
                })
            }
        };
        Ok(Some(LedgerState::new(
            top_hash,
            BlockHeight(height),
            self.peers()?,
        )))
    }

    /// An account's quorum, if the account exists.
    pub fn account_quorum(&self, id: &AccountId) -> Result<Option<u64>, StorageError> {
        Cursor::begin(self.backend).get_u64(&keys::account_quorum(id))
    }

    /// An account's balance string for one asset.
    pub fn account_balance(
        &self,
        id: &AccountId,
        asset: &AssetId,
    ) -> Result<Option<String>, StorageError> {
        Cursor::begin(self.backend).get_str(&keys::account_asset(id, asset))
    }

    /// An account's signatories in key order.
    pub fn signatories(&self, id: &AccountId) -> Result<Vec<PublicKey>, StorageError> {
        let cursor = Cursor::begin(self.backend);
        let prefix = keys::account_signatories_prefix(id);
        let mut result = Vec::new();
        let mut parse_error = None;
        cursor.enumerate(&prefix, |key, _| {
            match parse_pubkey(&key[prefix.len()..]) {
                Ok(pubkey) => {
                    result.push(pubkey);
                    ScanControl::Continue
                }
                Err(e) => {
                    parse_error = Some(e);
                    ScanControl::Stop
                }
            }
        })?;
        match parse_error {
            Some(e) => Err(e),
            None => Ok(result),
        }
    }
}

fn parse_pubkey(hex: &str) -> Result<PublicKey, StorageError> {
    let bytes = hex::decode(hex).map_err(|_| StorageError::CorruptValue {
        key: hex.to_string(),
        reason: "expected pubkey hex".into(),
    })?;
    let arr: [u8; 32] = bytes.try_into().map_err(|_| StorageError::CorruptValue {
        key: hex.to_string(),
        reason: "expected 32-byte pubkey".into(),
    })?;
    Ok(PublicKey(arr))
}
