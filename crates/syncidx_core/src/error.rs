//! Error types for the index engine.

use thiserror::Error;

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur in index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Underlying key-value store failure.
    ///
    /// Mutators commit atomically, so the store still satisfies the
    /// index invariants after this error.
    #[error("storage error: {0}")]
    Storage(#[from] syncidx_storage::StorageError),

    /// Malformed record bytes read back from the store.
    #[error("codec error: {0}")]
    Codec(#[from] syncidx_codec::CodecError),

    /// An operation named a folder the store does not know.
    #[error("folder not found: {name}")]
    FolderNotFound {
        /// The unknown folder name.
        name: String,
    },

    /// A stored folder name was not valid UTF-8.
    #[error("stored folder name is not valid UTF-8")]
    FolderNameNotUtf8,
}

impl IndexError {
    /// Creates a folder-not-found error.
    pub fn folder_not_found(name: impl Into<String>) -> Self {
        Self::FolderNotFound { name: name.into() }
    }
}
