//! # SyncIdx Codec
//!
//! Record model and deterministic binary codec for SyncIdx.
//!
//! This crate defines the types the index engine stores - device
//! identities, flag bitsets, and file records - together with their
//! fixed-format binary encoding.
//!
//! ## Encoding Rules
//!
//! - Fixed field order, little-endian integers, `u32` length prefixes
//! - No optional fields, no padding, no indefinite lengths
//! - Identical records produce identical bytes; stored bytes are
//!   directly comparable for change detection
//! - Decoding rejects truncated input and trailing bytes
//!
//! ## Usage
//!
//! ```
//! use syncidx_codec::{decode_record, encode_record, FileRecord};
//!
//! let record = FileRecord::new("some/path", 1000);
//! let bytes = encode_record(&record);
//! let decoded = decode_record(&bytes).unwrap();
//! assert_eq!(record, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decode;
mod encode;
mod error;
mod model;

pub use decode::{decode_global, decode_record};
pub use encode::{encode_global, encode_record};
pub use error::{CodecError, CodecResult};
pub use model::{BlockInfo, DeviceId, FileRecord, Flags};
