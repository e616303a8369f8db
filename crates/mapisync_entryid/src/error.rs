//! Error types for the entry-id crate.

use thiserror::Error;

/// Result type for entry-id operations.
pub type EntryIdResult<T> = Result<T, EntryIdError>;

/// Errors that can occur while decoding or rewriting an entry id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryIdError {
    /// The input is shorter than the fixed part of the shape being decoded.
    #[error("truncated {shape} entry id: need at least {needed} bytes, got {actual}")]
    Truncated {
        /// Shape that was being decoded.
        shape: &'static str,
        /// Minimum number of bytes for that shape.
        needed: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// The version field holds a value this codec does not know.
    #[error("unrecognized entry id version {version}")]
    UnrecognizedVersion {
        /// Version found on the wire.
        version: u32,
    },

    /// The bytes are not an entry id of the expected shape.
    #[error("invalid entry id: {message}")]
    InvalidEntryId {
        /// Description of the problem.
        message: String,
    },
}

impl EntryIdError {
    /// Creates a truncation error.
    pub fn truncated(shape: &'static str, needed: usize, actual: usize) -> Self {
        Self::Truncated {
            shape,
            needed,
            actual,
        }
    }

    /// Creates an invalid entry id error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidEntryId {
            message: message.into(),
        }
    }

    /// Returns true if callers should fall back to treating the bytes as opaque.
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Self::UnrecognizedVersion { .. })
    }
}
