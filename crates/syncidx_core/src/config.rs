//! FileSet configuration.

/// What iterators do when they hit an entry that fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorruptionPolicy {
    /// Stop the iteration and surface the codec error.
    #[default]
    Abort,
    /// Log the entry and keep iterating.
    Skip,
}

/// Configuration for a [`FileSet`](crate::FileSet).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexConfig {
    /// Policy applied when a stored entry fails to decode during
    /// iteration.
    pub corruption: CorruptionPolicy,
}

impl IndexConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a configuration that skips corrupt entries instead of
    /// aborting iteration.
    #[must_use]
    pub fn skip_corrupt(mut self) -> Self {
        self.corruption = CorruptionPolicy::Skip;
        self
    }
}
