//! In-memory ordered key-value store.

use crate::batch::{Batch, BatchOp};
use crate::error::StorageResult;
use crate::store::{KvIter, KvSnapshot, KvStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// An in-memory [`KvStore`] backed by a `BTreeMap`.
///
/// Suitable for:
/// - Unit and integration tests
/// - Ephemeral indexes that don't need persistence
///
/// Snapshots clone the tree, so taking one is O(n); point operations go
/// straight to the shared map.
///
/// # Example
///
/// ```rust
/// use syncidx_storage::{KvStore, MemoryKv};
///
/// let store = MemoryKv::new();
/// store.put(b"key", b"value").unwrap();
/// assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct MemoryKv {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns true when the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    fn apply(map: &mut BTreeMap<Vec<u8>, Vec<u8>>, batch: Batch) {
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.map.write().remove(key);
        Ok(())
    }

    fn write(&self, batch: Batch) -> StorageResult<()> {
        let mut map = self.map.write();
        Self::apply(&mut map, batch);
        Ok(())
    }

    fn range(&self, start: &[u8], end: &[u8]) -> StorageResult<KvIter<'static>> {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = self
            .map
            .read()
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(pairs.into_iter()))
    }

    fn snapshot(&self) -> StorageResult<Box<dyn KvSnapshot>> {
        Ok(Box::new(MemorySnapshot {
            map: self.map.read().clone(),
        }))
    }
}

/// A point-in-time view of a [`MemoryKv`].
#[derive(Debug)]
pub struct MemorySnapshot {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemorySnapshot {
    /// Creates a snapshot directly over an owned tree.
    #[must_use]
    pub fn from_map(map: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        Self { map }
    }
}

impl KvSnapshot for MemorySnapshot {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    fn range(&self, start: &[u8], end: &[u8]) -> StorageResult<KvIter<'_>> {
        Ok(Box::new(
            self.map
                .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
                .map(|(k, v)| (k.clone(), v.clone())),
        ))
    }
}
