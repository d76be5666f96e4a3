//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding stored record bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Unexpected end of input.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof {
        /// Offset at which more bytes were expected.
        offset: usize,
    },

    /// A name field was not valid UTF-8.
    #[error("invalid UTF-8 in name field")]
    InvalidUtf8,

    /// Input had bytes left over after a complete record.
    #[error("{count} trailing bytes after record")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        count: usize,
    },

    /// A length field exceeded its sanity limit.
    #[error("{field} length {len} exceeds maximum {max}")]
    OversizedField {
        /// Name of the offending field.
        field: &'static str,
        /// The declared length.
        len: u64,
        /// The allowed maximum.
        max: u64,
    },
}

impl CodecError {
    /// Creates an unexpected-EOF error at `offset`.
    #[must_use]
    pub fn eof(offset: usize) -> Self {
        Self::UnexpectedEof { offset }
    }

    /// Creates an oversized-field error.
    #[must_use]
    pub fn oversized(field: &'static str, len: u64, max: u64) -> Self {
        Self::OversizedField { field, len, max }
    }
}
