//! Ordered key-value store traits.

use crate::batch::Batch;
use crate::error::StorageResult;

/// A forward iterator over `(key, value)` pairs in ascending key order.
pub type KvIter<'a> = Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

/// An ordered byte-keyed store.
///
/// Keys are opaque byte strings ordered lexicographically. The store does
/// not interpret keys or values; all layout knowledge lives above it.
///
/// # Invariants
///
/// - `get` after `put` returns exactly the bytes written
/// - `write` applies a [`Batch`] atomically: either every operation in
///   the batch is visible afterwards or none is
/// - `range` yields pairs with `start <= key < end` in ascending order
/// - `snapshot` returns a consistent point-in-time view that is not
///   affected by later writes
///
/// # Implementors
///
/// - [`MemoryKv`](crate::MemoryKv) - for tests and ephemeral indexes
/// - [`LogKv`](crate::LogKv) - persistent, backed by a redo log file
pub trait KvStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Inserts or overwrites a single key.
    ///
    /// Equivalent to writing a one-operation batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Removes a single key. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Applies `batch` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; no operation from the batch
    /// is visible in that case.
    fn write(&self, batch: Batch) -> StorageResult<()>;

    /// Iterates keys in `start..end` (end exclusive) in ascending order.
    ///
    /// The returned iterator is detached from later writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn range(&self, start: &[u8], end: &[u8]) -> StorageResult<KvIter<'static>>;

    /// Takes a consistent point-in-time view of the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be taken.
    fn snapshot(&self) -> StorageResult<Box<dyn KvSnapshot>>;
}

/// A read-only point-in-time view of a [`KvStore`].
pub trait KvSnapshot: Send {
    /// Reads the value stored under `key` at snapshot time.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Iterates keys in `start..end` (end exclusive) as of snapshot time.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn range(&self, start: &[u8], end: &[u8]) -> StorageResult<KvIter<'_>>;
}
