//! Error types for the k-winners layer.
//!
//! Configuration problems are raised eagerly at construction so they never
//! surface mid-training. Shape and cache violations raised during
//! forward/backward are programming errors on the caller's side and are
//! reported rather than silently truncated or padded.

/// Primary error type for k-winners operations.
#[derive(Debug, thiserror::Error)]
pub enum KWinnerError {
    /// The layer configuration is unusable (density, boost strength, counts).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A shape descriptor has no dimensions, too many, or a zero extent.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// A sample vector length disagrees with the configured input size.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured input size.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// Backward was called with a batch size different from the latest forward.
    #[error("batch size mismatch: latest forward saw {expected} samples, backward got {actual}")]
    BatchSizeMismatch {
        /// Batch size of the most recent forward call.
        expected: usize,
        /// Batch size passed to backward.
        actual: usize,
    },

    /// Backward was called before any forward populated the winner cache.
    #[error("winner cache is empty: backward called before forward")]
    MissingForwardCache,

    /// Restored state does not agree with its own configuration.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KWinnerError>;
