//! Append-only block storage.
//!
//! Blocks persist outside the world state so the WSV can be rebuilt from
//! them at any time. Heights are encoded zero-padded in keys so prefix scans
//! return chain order.

use crate::error::StorageError;
use crate::storage::{KvBackend, WriteOp};
use ledger_types::{Block, BlockHeight, Hash};

const TOP_HEIGHT_KEY: &str = "blocks_meta/top_height";

fn block_key(height: BlockHeight) -> String {
    format!("blocks/{:020}", height.0)
}

fn hash_index_key(hash: &Hash) -> String {
    format!("blocks_by_hash/{}", hash.to_hex())
}

/// Block storage over any [`KvBackend`].
pub struct BlockStore<'a> {
    backend: &'a dyn KvBackend,
}

impl<'a> BlockStore<'a> {
    pub fn new(backend: &'a dyn KvBackend) -> Self {
        Self { backend }
    }

    /// Height of the newest stored block; 0 when the store is empty.
    pub fn top_height(&self) -> Result<BlockHeight, StorageError> {
        match self.backend.get(TOP_HEIGHT_KEY)? {
            None => Ok(BlockHeight(0)),
            Some(bytes) => crate::cursor::decode_u64(TOP_HEIGHT_KEY, &bytes).map(BlockHeight),
        }
    }

    /// Fetch a block by height.
    pub fn get(&self, height: BlockHeight) -> Result<Option<Block>, StorageError> {
        let key = block_key(height);
        match self.backend.get(&key)? {
            None => Ok(None),
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StorageError::CorruptValue {
                    key,
                    reason: e.to_string(),
                }),
        }
    }

    /// Fetch a block by hash.
    pub fn get_by_hash(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        let index_key = hash_index_key(hash);
        match self.backend.get(&index_key)? {
            None => Ok(None),
            Some(bytes) => {
                let height = crate::cursor::decode_u64(&index_key, &bytes)?;
                self.get(BlockHeight(height))
            }
        }
    }

    /// Append a block. The height must extend the chain by exactly one.
    pub fn put(&self, block: &Block) -> Result<(), StorageError> {
        let top = self.top_height()?;
        if block.height().0 != top.0 + 1 {
            return Err(StorageError::Database(format!(
                "block height {} does not extend top {}",
                block.height(),
                top
            )));
        }

        let bytes = bincode::serialize(block)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        self.backend.write_batch(vec![
            WriteOp::Put(block_key(block.height()), bytes),
            WriteOp::Put(
                hash_index_key(&block.hash()),
                block.height().0.to_string().into_bytes(),
            ),
            WriteOp::Put(
                TOP_HEIGHT_KEY.into(),
                block.height().0.to_string().into_bytes(),
            ),
        ])
    }
}
