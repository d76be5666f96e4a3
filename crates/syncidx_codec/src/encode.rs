//! Deterministic record encoding.
//!
//! The layout is fixed-format, little-endian, length-prefixed:
//!
//! ```text
//! record := version u64 | local_version u64 | flags u32 | size u64
//!         | name_len u32 | name bytes
//!         | block_count u32 | block*
//! block  := size u32 | hash_len u32 | hash bytes
//! global := record | device_count u32 | device_id[32]*
//! ```
//!
//! Two records encode to identical bytes iff all their fields are equal,
//! so encoded bytes double as an equality check across restarts.

use crate::model::{DeviceId, FileRecord};

/// Encodes a file record to its stored representation.
#[must_use]
pub fn encode_record(record: &FileRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(record_len(record));
    put_record(&mut buf, record);
    buf
}

/// Encodes a global entry: the winning record followed by the
/// availability device list.
///
/// Callers pass `availability` sorted ascending so the encoding is
/// deterministic.
#[must_use]
pub fn encode_global(winner: &FileRecord, availability: &[DeviceId]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(record_len(winner) + 4 + availability.len() * DeviceId::LEN);
    put_record(&mut buf, winner);
    buf.extend_from_slice(&(availability.len() as u32).to_le_bytes());
    for device in availability {
        buf.extend_from_slice(device.as_bytes());
    }
    buf
}

fn record_len(record: &FileRecord) -> usize {
    let blocks: usize = record.blocks.iter().map(|b| 8 + b.hash.len()).sum();
    8 + 8 + 4 + 8 + 4 + record.name.len() + 4 + blocks
}

fn put_record(buf: &mut Vec<u8>, record: &FileRecord) {
    buf.extend_from_slice(&record.version.to_le_bytes());
    buf.extend_from_slice(&record.local_version.to_le_bytes());
    buf.extend_from_slice(&record.flags.bits().to_le_bytes());
    buf.extend_from_slice(&record.size.to_le_bytes());
    buf.extend_from_slice(&(record.name.len() as u32).to_le_bytes());
    buf.extend_from_slice(record.name.as_bytes());
    buf.extend_from_slice(&(record.blocks.len() as u32).to_le_bytes());
    for block in &record.blocks {
        buf.extend_from_slice(&block.size.to_le_bytes());
        buf.extend_from_slice(&(block.hash.len() as u32).to_le_bytes());
        buf.extend_from_slice(&block.hash);
    }
}
