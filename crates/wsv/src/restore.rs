//! World-state restore.
//!
//! Rebuilds the WSV by replaying stored blocks through the command executor,
//! one nested transaction per block. The genesis block (height 1) is applied
//! without validation; every later block goes through the block validator
//! first.

use crate::block_store::BlockStore;
use crate::cursor::Cursor;
use crate::error::{StorageError, TransactionError};
use crate::executor::CommandExecutor;
use crate::keys;
use crate::storage::KvBackend;
use ledger_types::{Block, BlockHeight, Hash};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Poll interval for `wait_for_new_blocks` mode.
const WAIT_FOR_BLOCK_TIME: Duration = Duration::from_secs(5);

/// Validates a block before it is replayed.
///
/// The concrete validation stack (wire-format checks, signature checks) is
/// provided by the caller; restore only guarantees it runs for every
/// non-genesis block.
pub trait BlockValidator {
    fn validate(&self, block: &Block) -> Result<(), String>;
}

/// Structural validator: height continuity and previous-hash chaining.
pub struct ChainValidator;

impl BlockValidator for ChainValidator {
    fn validate(&self, block: &Block) -> Result<(), String> {
        if block.height().0 == 0 {
            return Err("block height 0 is reserved".into());
        }
        Ok(())
    }
}

/// Errors raised during restore.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("missing block at height {0}")]
    MissingBlock(BlockHeight),

    #[error("inconsistent block height in block storage: expected {expected}, got {actual}")]
    HeightMismatch {
        expected: BlockHeight,
        actual: BlockHeight,
    },

    #[error("broken chain at height {height}: previous hash does not match")]
    BrokenChain { height: BlockHeight },

    #[error("block {height} failed validation: {reason}")]
    InvalidBlock { height: BlockHeight, reason: String },

    #[error("block {height} failed to apply: {source}")]
    ApplyFailed {
        height: BlockHeight,
        source: TransactionError,
    },
}

/// Lazy iterator over stored blocks `[from, to]`, validating as it goes.
pub struct BlockRange<'a, V> {
    store: &'a BlockStore<'a>,
    validator: &'a V,
    next: u64,
    end: u64,
    prev_hash: Option<Hash>,
}

impl<'a, V: BlockValidator> BlockRange<'a, V> {
    pub fn new(store: &'a BlockStore<'a>, validator: &'a V, from: BlockHeight, to: BlockHeight) -> Self {
        Self {
            store,
            validator,
            next: from.0,
            end: to.0,
            prev_hash: None,
        }
    }
}

impl<V: BlockValidator> Iterator for BlockRange<'_, V> {
    type Item = Result<Block, RestoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.end {
            return None;
        }
        let height = BlockHeight(self.next);
        self.next += 1;

        let block = match self.store.get(height) {
            Ok(Some(block)) => block,
            Ok(None) => return Some(Err(RestoreError::MissingBlock(height))),
            Err(e) => return Some(Err(e.into())),
        };

        if block.height() != height {
            return Some(Err(RestoreError::HeightMismatch {
                expected: height,
                actual: block.height(),
            }));
        }
        if let Some(prev) = self.prev_hash {
            if block.prev_hash() != prev {
                return Some(Err(RestoreError::BrokenChain { height }));
            }
        }
        self.prev_hash = Some(block.hash());

        // The genesis block carries unsigned bootstrap transactions and is
        // exempt from validation.
        if height.0 != 1 {
            if let Err(reason) = self.validator.validate(&block) {
                return Some(Err(RestoreError::InvalidBlock { height, reason }));
            }
        }

        Some(Ok(block))
    }
}

/// Height of the last block already folded into the WSV.
pub fn wsv_height(backend: &dyn KvBackend) -> Result<BlockHeight, StorageError> {
    let cursor = Cursor::begin(backend);
    Ok(BlockHeight(cursor.get_u64(keys::WSV_HEIGHT)?.unwrap_or(0)))
}

/// Replay stored blocks `[wsv_height+1, storage_top]` into the world state.
///
/// Returns the height after restore. With `wait_for_new_blocks`, keeps
/// polling the block store for growth and restarting the loop; this mode
/// never returns unless an error occurs.
pub fn restore_wsv<V: BlockValidator>(
    backend: &dyn KvBackend,
    validator: &V,
    wait_for_new_blocks: bool,
) -> Result<BlockHeight, RestoreError> {
    loop {
        let applied = restore_once(backend, validator)?;
        if !wait_for_new_blocks {
            return Ok(applied);
        }
        std::thread::sleep(WAIT_FOR_BLOCK_TIME);
    }
}

fn restore_once<V: BlockValidator>(
    backend: &dyn KvBackend,
    validator: &V,
) -> Result<BlockHeight, RestoreError> {
    let store = BlockStore::new(backend);
    let top = store.top_height()?;
    let mut applied = wsv_height(backend)?;

    if applied >= top {
        return Ok(applied);
    }
    info!(from = applied.0 + 1, to = top.0, "restoring world state");

    for block in BlockRange::new(&store, validator, BlockHeight(applied.0 + 1), top) {
        let block = block?;
        let height = block.height();

        let mut executor = CommandExecutor::new(backend);
        executor
            .apply_block(&block, height.0 != 1)
            .map_err(|source| RestoreError::ApplyFailed { height, source })?;
        executor.commit().map_err(RestoreError::Storage)?;

        applied = height;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use ledger_types::test_utils::test_keypair;
    use ledger_types::{
        AccountId, Amount, AssetId, BlockPayload, Command, DomainId, RoleName, RolePermission,
        Transaction, TransactionPayload,
    };

    fn genesis_block() -> Block {
        let payload = TransactionPayload {
            creator_account_id: None,
            commands: vec![
                Command::CreateRole {
                    role_name: RoleName::new("admin"),
                    permissions: vec![RolePermission::Root],
                },
                Command::CreateDomain {
                    domain_id: DomainId::new("test"),
                    default_role: RoleName::new("admin"),
                },
                Command::CreateAccount {
                    account_name: "admin".into(),
                    domain_id: DomainId::new("test"),
                    pubkey: test_keypair(1).public_key(),
                },
                Command::CreateAsset {
                    asset_name: "coin".into(),
                    domain_id: DomainId::new("test"),
                    precision: 2,
                },
            ],
            quorum: 1,
            created_ms: 0,
        };
        Block::new(BlockPayload {
            height: BlockHeight(1),
            prev_hash: Hash::ZERO,
            created_ms: 0,
            transactions: vec![Transaction::new(payload)],
            rejected_hashes: vec![],
        })
    }

    fn mint_block(height: u64, prev: Hash, amount: &str) -> Block {
        let keypair = test_keypair(1);
        let mut tx = Transaction::new(TransactionPayload {
            creator_account_id: Some(AccountId::new("admin", "test")),
            commands: vec![Command::AddAssetQuantity {
                asset_id: AssetId::new("coin", "test"),
                amount: Amount::parse(amount).unwrap(),
            }],
            quorum: 1,
            created_ms: height,
        });
        tx.sign(&keypair);
        let mut block = Block::new(BlockPayload {
            height: BlockHeight(height),
            prev_hash: prev,
            created_ms: height,
            transactions: vec![tx],
            rejected_hashes: vec![],
        });
        block.sign(&keypair);
        block
    }

    #[test]
    fn replay_reproduces_wsv() {
        // Build a chain, apply it live on one backend, restore it on
        // another, and require byte-identical world states.
        let genesis = genesis_block();
        let second = mint_block(2, genesis.hash(), "10.50");
        let third = mint_block(3, second.hash(), "0.25");

        let live = MemoryBackend::new();
        let restored = MemoryBackend::new();
        for backend in [&live, &restored] {
            let store = BlockStore::new(backend);
            store.put(&genesis).unwrap();
            store.put(&second).unwrap();
            store.put(&third).unwrap();
        }

        // Live path: apply blocks as they commit.
        for block in [&genesis, &second, &third] {
            let mut executor = CommandExecutor::new(&live);
            executor.apply_block(block, block.height().0 != 1).unwrap();
            executor.commit().unwrap();
        }

        // Restore path: replay from the store.
        let applied = restore_wsv(&restored, &ChainValidator, false).unwrap();
        assert_eq!(applied, BlockHeight(3));

        assert_eq!(live.dump(), restored.dump());
        assert_eq!(
            restored
                .get("account/test/admin/assets/coin#test")
                .unwrap(),
            Some(b"10.75".to_vec())
        );
    }

    #[test]
    fn restore_is_incremental() {
        let genesis = genesis_block();
        let second = mint_block(2, genesis.hash(), "1.00");

        let backend = MemoryBackend::new();
        let store = BlockStore::new(&backend);
        store.put(&genesis).unwrap();

        assert_eq!(
            restore_wsv(&backend, &ChainValidator, false).unwrap(),
            BlockHeight(1)
        );

        store.put(&second).unwrap();
        assert_eq!(
            restore_wsv(&backend, &ChainValidator, false).unwrap(),
            BlockHeight(2)
        );

        // Re-running with nothing new is a no-op.
        assert_eq!(
            restore_wsv(&backend, &ChainValidator, false).unwrap(),
            BlockHeight(2)
        );
    }

    #[test]
    fn broken_chain_is_detected() {
        let genesis = genesis_block();
        // Wrong prev hash.
        let bad = mint_block(2, Hash::digest(b"not the genesis hash"), "1.00");

        let backend = MemoryBackend::new();
        let store = BlockStore::new(&backend);
        store.put(&genesis).unwrap();
        store.put(&bad).unwrap();

        let err = restore_wsv(&backend, &ChainValidator, false).unwrap_err();
        assert!(matches!(err, RestoreError::BrokenChain { height } if height == BlockHeight(2)));
    }
}
