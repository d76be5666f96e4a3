//! # SyncIdx Testkit
//!
//! Shared test utilities for the SyncIdx crates:
//! - Property-based generators for records, flags, and device ids
//! - Mutation-sequence generators for index invariant tests
//! - Proptest configuration presets

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod generators;

pub use generators::{
    blocks_strategy, device_id_strategy, flags_strategy, indexed_name_strategy,
    op_sequence_strategy, op_strategy, record_strategy, IndexOp, PropTestConfig,
};
