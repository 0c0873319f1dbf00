//! Key-value storage backends.
//!
//! The world state persists in an ordered string-keyed store behind the
//! [`KvBackend`] trait. Production uses RocksDB; tests and simulation use the
//! in-memory backend. All mutation goes through [`KvBackend::write_batch`] so
//! a transaction commits atomically.

use crate::error::StorageError;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

/// One write in a commit batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(String, Vec<u8>),
    Delete(String),
}

/// Whether a prefix scan should continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

/// An ordered key-value store.
pub trait KvBackend: Send + Sync {
    /// Read one key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Apply a batch of writes atomically.
    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError>;

    /// Visit every key with the given prefix in ascending key order.
    fn scan_prefix(
        &self,
        prefix: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> ScanControl,
    ) -> Result<(), StorageError>;
}

/// In-memory backend for tests and simulation.
#[derive(Default)]
pub struct MemoryBackend {
    map: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.map.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the full contents, for state comparison in tests.
    pub fn dump(&self) -> BTreeMap<String, Vec<u8>> {
        self.map.read().expect("lock poisoned").clone()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.map.read().expect("lock poisoned").get(key).cloned())
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut map = self.map.write().expect("lock poisoned");
        for op in ops {
            match op {
                WriteOp::Put(key, value) => {
                    map.insert(key, value);
                }
                WriteOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(
        &self,
        prefix: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> ScanControl,
    ) -> Result<(), StorageError> {
        let map = self.map.read().expect("lock poisoned");
        for (key, value) in map.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if visit(key, value) == ScanControl::Stop {
                break;
            }
        }
        Ok(())
    }
}

/// RocksDB backend for production use.
pub struct RocksBackend {
    db: rocksdb::DB,
}

impl RocksBackend {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = rocksdb::DB::open(&opts, path)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(Self { db })
    }
}

impl KvBackend for RocksBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key.as_bytes())
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut batch = rocksdb::WriteBatch::default();
        for op in &ops {
            match op {
                WriteOp::Put(key, value) => batch.put(key.as_bytes(), value),
                WriteOp::Delete(key) => batch.delete(key.as_bytes()),
            }
        }
        self.db
            .write(batch)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn scan_prefix(
        &self,
        prefix: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> ScanControl,
    ) -> Result<(), StorageError> {
        let iter = self.db.iterator(rocksdb::IteratorMode::From(
            prefix.as_bytes(),
            rocksdb::Direction::Forward,
        ));

        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::Database(e.to_string()))?;
            let Ok(key) = std::str::from_utf8(&key) else {
                // Foreign (non-path) keys sort after all path keys; stop.
                break;
            };
            if !key.starts_with(prefix) {
                break;
            }
            if visit(key, &value) == ScanControl::Stop {
                break;
            }
        }
        Ok(())
    }
}
