//! Property-based test generators using proptest.
//!
//! The generators deliberately draw from small universes - a handful of
//! names, a few devices, low versions - so that generated mutation
//! sequences actually collide on paths and exercise the version rule.

use proptest::prelude::*;
use syncidx_codec::{BlockInfo, DeviceId, FileRecord, Flags};

/// Names used by [`indexed_name_strategy`]; small enough that sequences
/// revisit the same paths.
const NAME_POOL: &[&str] = &["a", "b", "c", "sub/d", "sub/e"];

/// Strategy for arbitrary device ids.
pub fn device_id_strategy() -> impl Strategy<Value = DeviceId> {
    prop::array::uniform32(any::<u8>()).prop_map(DeviceId::new)
}

/// Strategy for names drawn from a small fixed pool.
pub fn indexed_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(NAME_POOL).prop_map(|name| name.to_string())
}

/// Strategy for flag sets: mostly plain records, sometimes deleted,
/// invalid, or directory, occasionally with an opaque bit.
pub fn flags_strategy() -> impl Strategy<Value = Flags> {
    prop_oneof![
        5 => Just(Flags::default()),
        1 => Just(Flags::DELETED),
        1 => Just(Flags::INVALID),
        1 => Just(Flags::DIRECTORY),
        1 => Just(Flags::DELETED | Flags::DIRECTORY),
        1 => Just(Flags::new(0b11)),
    ]
}

/// Strategy for short block lists over a tiny hash alphabet, so
/// distinct records still sometimes share contents.
pub fn blocks_strategy() -> impl Strategy<Value = Vec<BlockInfo>> {
    prop::collection::vec(
        (0u32..4, prop::collection::vec(0u8..2, 4)).prop_map(|(size, hash)| BlockInfo {
            size,
            hash,
        }),
        0..3,
    )
}

/// Strategy for file records over the fixed name pool.
///
/// Versions include zero, which the engine must treat as reserved and
/// skip.
pub fn record_strategy() -> impl Strategy<Value = FileRecord> {
    (indexed_name_strategy(), 0u64..6, flags_strategy(), blocks_strategy()).prop_map(
        |(name, version, flags, blocks)| FileRecord {
            name,
            version,
            local_version: 0,
            flags,
            size: version * 10,
            blocks,
        },
    )
}

/// One mutation against a FileSet, with the device given as an index
/// into the caller's device pool.
#[derive(Debug, Clone)]
pub enum IndexOp {
    /// Install the records as the device's complete have set.
    Replace {
        /// Index into the caller's device pool.
        device: usize,
        /// The new have set.
        records: Vec<FileRecord>,
    },
    /// Install the records, tombstoning what disappeared.
    ReplaceWithDelete {
        /// Index into the caller's device pool.
        device: usize,
        /// The new have set.
        records: Vec<FileRecord>,
    },
    /// Upsert the records, leaving other paths untouched.
    Update {
        /// Index into the caller's device pool.
        device: usize,
        /// The records to merge in.
        records: Vec<FileRecord>,
    },
}

impl IndexOp {
    /// Returns the device-pool index this operation targets.
    #[must_use]
    pub fn device(&self) -> usize {
        match self {
            Self::Replace { device, .. }
            | Self::ReplaceWithDelete { device, .. }
            | Self::Update { device, .. } => *device,
        }
    }

    /// Returns the operation's input records.
    #[must_use]
    pub fn records(&self) -> &[FileRecord] {
        match self {
            Self::Replace { records, .. }
            | Self::ReplaceWithDelete { records, .. }
            | Self::Update { records, .. } => records,
        }
    }
}

/// Strategy for a single mutation against a pool of `devices` devices.
pub fn op_strategy(devices: usize) -> impl Strategy<Value = IndexOp> {
    let records = prop::collection::vec(record_strategy(), 0..6);
    (0..devices, records, 0u8..3).prop_map(|(device, records, kind)| match kind {
        0 => IndexOp::Replace { device, records },
        1 => IndexOp::ReplaceWithDelete { device, records },
        _ => IndexOp::Update { device, records },
    })
}

/// Strategy for a sequence of mutations against a pool of `devices`
/// devices.
pub fn op_sequence_strategy(
    devices: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<IndexOp>> {
    prop::collection::vec(op_strategy(devices), 1..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to a proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
