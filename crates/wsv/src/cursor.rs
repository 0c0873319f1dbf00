//! Transactional cursor over the world state.
//!
//! A [`Cursor`] buffers writes in a stack of overlay layers, one per active
//! savepoint, and flushes them as a single atomic batch on commit. Exactly
//! one cursor is active per executor; nothing reads the backend concurrently
//! with a commit.
//!
//! Unsigned counters are stored as ASCII decimal; amounts as their canonical
//! decimal string. Both are human-readable in a raw dump, and replay
//! produces byte-identical values.

use crate::error::StorageError;
use crate::storage::{KvBackend, ScanControl, WriteOp};
use std::collections::BTreeMap;

/// Existence requirement a caller attaches to a read or a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistencePolicy {
    /// Missing key is an error.
    MustExist,
    /// Present key is an error.
    MustNotExist,
    /// Either way is fine; a missing key reads as `None`.
    CanExist,
}

/// Outcome of a policy-checked access.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("key already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

type Layer = BTreeMap<String, Option<Vec<u8>>>;

/// A savepointed transaction over a [`KvBackend`].
pub struct Cursor<'a> {
    backend: &'a dyn KvBackend,
    /// Overlay layers, oldest first. `None` values are tombstones.
    layers: Vec<Layer>,
    /// Active savepoints: name and the index of the layer they opened.
    savepoints: Vec<(String, usize)>,
}

impl<'a> Cursor<'a> {
    /// Begin a transaction.
    pub fn begin(backend: &'a dyn KvBackend) -> Self {
        Self {
            backend,
            layers: vec![Layer::new()],
            savepoints: Vec::new(),
        }
    }

    /// Open a named savepoint.
    pub fn savepoint(&mut self, name: &str) {
        self.savepoints.push((name.to_string(), self.layers.len()));
        self.layers.push(Layer::new());
    }

    /// Discard every write made since the named savepoint. The savepoint
    /// itself stays open.
    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), KvError> {
        let pos = self
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| KvError::NotFound(format!("savepoint {name}")))?;
        let layer_index = self.savepoints[pos].1;

        self.savepoints.truncate(pos + 1);
        self.layers.truncate(layer_index);
        self.layers.push(Layer::new());
        Ok(())
    }

    /// Fold the writes made since the named savepoint into the enclosing
    /// scope and close the savepoint.
    pub fn release_savepoint(&mut self, name: &str) -> Result<(), KvError> {
        let pos = self
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| KvError::NotFound(format!("savepoint {name}")))?;
        let layer_index = self.savepoints[pos].1;

        let folded: Vec<Layer> = self.layers.split_off(layer_index);
        let parent = self.layers.last_mut().expect("base layer always present");
        for layer in folded {
            parent.extend(layer);
        }
        self.savepoints.truncate(pos);
        Ok(())
    }

    /// Commit the transaction: flush all buffered writes as one batch.
    pub fn commit(self) -> Result<(), StorageError> {
        let mut merged = Layer::new();
        for layer in self.layers {
            merged.extend(layer);
        }
        let ops: Vec<WriteOp> = merged
            .into_iter()
            .map(|(key, value)| match value {
                Some(v) => WriteOp::Put(key, v),
                None => WriteOp::Delete(key),
            })
            .collect();
        self.backend.write_batch(ops)
    }

    /// Advisory prepared commit. Without write-ahead support in the backend
    /// this is equivalent to [`commit`](Self::commit).
    pub fn prepare(self, _name: &str) -> Result<(), StorageError> {
        self.commit()
    }

    /// Discard the transaction.
    pub fn rollback(self) {}

    /// Read a key, seeing uncommitted writes.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        for layer in self.layers.iter().rev() {
            if let Some(value) = layer.get(key) {
                return Ok(value.clone());
            }
        }
        self.backend.get(key)
    }

    /// Read a key under an existence policy.
    pub fn get_checked(
        &self,
        key: &str,
        policy: ExistencePolicy,
    ) -> Result<Option<Vec<u8>>, KvError> {
        let value = self.get(key)?;
        match policy {
            ExistencePolicy::MustExist if value.is_none() => {
                Err(KvError::NotFound(key.to_string()))
            }
            ExistencePolicy::MustNotExist if value.is_some() => {
                Err(KvError::AlreadyExists(key.to_string()))
            }
            _ => Ok(value),
        }
    }

    /// Buffer a write.
    pub fn put(&mut self, key: &str, value: impl Into<Vec<u8>>) {
        self.top_layer().insert(key.to_string(), Some(value.into()));
    }

    /// Buffer a delete.
    pub fn delete(&mut self, key: &str) {
        self.top_layer().insert(key.to_string(), None);
    }

    /// Visit every live key with the given prefix in ascending order,
    /// merging uncommitted writes over the backend contents.
    pub fn enumerate(
        &self,
        prefix: &str,
        mut visit: impl FnMut(&str, &[u8]) -> ScanControl,
    ) -> Result<(), StorageError> {
        let mut merged: BTreeMap<String, Option<Vec<u8>>> = BTreeMap::new();
        self.backend.scan_prefix(prefix, &mut |key, value| {
            merged.insert(key.to_string(), Some(value.to_vec()));
            ScanControl::Continue
        })?;
        for layer in &self.layers {
            for (key, value) in layer.range(prefix.to_string()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                merged.insert(key.clone(), value.clone());
            }
        }

        for (key, value) in merged {
            let Some(value) = value else { continue };
            if visit(&key, &value) == ScanControl::Stop {
                break;
            }
        }
        Ok(())
    }

    /// Count live keys under a prefix.
    pub fn count_prefix(&self, prefix: &str) -> Result<u64, StorageError> {
        let mut count = 0u64;
        self.enumerate(prefix, |_, _| {
            count += 1;
            ScanControl::Continue
        })?;
        Ok(count)
    }

    // ── typed value encoding ───────────────────────────────────────────────

    /// Store an unsigned counter as ASCII decimal.
    pub fn put_u64(&mut self, key: &str, value: u64) {
        self.put(key, value.to_string().into_bytes());
    }

    /// Read an ASCII decimal counter.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, StorageError> {
        match self.get(key)? {
            None => Ok(None),
            Some(bytes) => decode_u64(key, &bytes).map(Some),
        }
    }

    /// Store a UTF-8 string value.
    pub fn put_str(&mut self, key: &str, value: &str) {
        self.put(key, value.as_bytes().to_vec());
    }

    /// Read a UTF-8 string value.
    pub fn get_str(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.get(key)? {
            None => Ok(None),
            Some(bytes) => decode_str(key, bytes).map(Some),
        }
    }

    fn top_layer(&mut self) -> &mut Layer {
        self.layers.last_mut().expect("base layer always present")
    }
}

/// Decode an ASCII decimal counter value.
pub fn decode_u64(key: &str, bytes: &[u8]) -> Result<u64, StorageError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StorageError::CorruptValue {
            key: key.to_string(),
            reason: "expected decimal integer".into(),
        })
}

/// Decode a UTF-8 string value.
pub fn decode_str(key: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
    String::from_utf8(bytes).map_err(|_| StorageError::CorruptValue {
        key: key.to_string(),
        reason: "expected utf-8".into(),
    })
}
