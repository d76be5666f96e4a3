//! The logical clock used to stamp synthesized tombstones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// A Lamport-style logical clock.
///
/// `tick` returns strictly increasing values; `observe` advances the
/// clock past externally seen values. The engine observes the `version`
/// of every record it ingests, so values produced by `tick` dominate
/// every version previously seen by this process.
///
/// The clock itself is in-memory. Callers that need tombstone authority
/// across restarts persist [`current`](Self::current) and re-seed with
/// [`observe`](Self::observe) at startup; reopening a FileSet also
/// re-observes every stored version, which restores a safe value once
/// the folder has been read back.
#[derive(Debug, Default)]
pub struct LogicalClock {
    counter: AtomicU64,
}

impl LogicalClock {
    /// Creates a clock starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Creates a clock seeded with a previously persisted value.
    #[must_use]
    pub const fn starting_at(value: u64) -> Self {
        Self {
            counter: AtomicU64::new(value),
        }
    }

    /// Returns the process-global clock shared by all FileSets that do
    /// not supply their own.
    pub fn global() -> Arc<LogicalClock> {
        static GLOBAL: OnceLock<Arc<LogicalClock>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(LogicalClock::new())))
    }

    /// Returns the next tick, strictly greater than every earlier tick
    /// and every observed value.
    pub fn tick(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Advances the clock to at least `value`.
    pub fn observe(&self, value: u64) {
        self.counter.fetch_max(value, Ordering::SeqCst);
    }

    /// Returns the current clock value without advancing it.
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}
