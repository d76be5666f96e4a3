//! Shared helpers for SyncIdx benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use syncidx_core::{DeviceId, FileRecord, FileSet, IndexConfig, LogicalClock};
use syncidx_storage::{KvStore, MemoryKv};

/// A fixed non-local device id for benchmark remotes.
pub const REMOTE: DeviceId = DeviceId::new([1; 32]);

/// Generates `n` records named `file0..fileN` at the given version.
#[must_use]
pub fn gen_records(n: usize, version: u64) -> Vec<FileRecord> {
    (0..n)
        .map(|i| FileRecord::new(format!("file{i}"), version))
        .collect()
}

/// Opens a FileSet over a fresh in-memory store with a private clock.
#[must_use]
pub fn bench_set(folder: &str) -> FileSet {
    let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    FileSet::open_with(
        store,
        folder,
        Arc::new(LogicalClock::new()),
        IndexConfig::default(),
    )
    .expect("open bench set")
}
