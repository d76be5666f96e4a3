//! # SyncIdx Storage
//!
//! Ordered key-value storage contract and backends for SyncIdx.
//!
//! This crate provides the lowest-level storage abstraction for the
//! index engine. Stores are **ordered opaque byte maps** - they do not
//! interpret the keys or values they hold.
//!
//! ## Design Principles
//!
//! - Stores are simple ordered byte maps (get, put, delete, range)
//! - Batches commit atomically; readers see all of a batch or none of it
//! - Snapshots are consistent point-in-time views
//! - Must be `Send + Sync` for concurrent access
//! - The index engine owns all key layout interpretation
//!
//! ## Available Backends
//!
//! - [`MemoryKv`] - for testing and ephemeral indexes
//! - [`LogKv`] - persistent, backed by a checksummed redo log file

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod log;
mod memory;
mod store;

pub use batch::{Batch, BatchOp};
pub use error::{StorageError, StorageResult};
pub use log::{LogKv, LOG_MAGIC, LOG_VERSION};
pub use memory::{MemoryKv, MemorySnapshot};
pub use store::{KvIter, KvSnapshot, KvStore};
