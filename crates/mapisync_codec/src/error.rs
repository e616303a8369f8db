//! Error types for the codec crate.

use crate::code::ErrorCode;
use crate::tag::{PropTag, PropType};
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while copying, marshaling or framing values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A buffer could not be grown.
    #[error("not enough memory for {requested} bytes")]
    NotEnoughMemory {
        /// Number of bytes requested.
        requested: usize,
    },

    /// The value does not fit the declared property type.
    #[error("type mismatch for {tag}: value has type {actual}")]
    TypeMismatch {
        /// Declared tag.
        tag: PropTag,
        /// Type of the value supplied.
        actual: PropType,
    },

    /// The property type has no wire representation.
    #[error("unsupported property type {0}")]
    UnsupportedType(PropType),

    /// A malformed value was supplied.
    #[error("invalid value: {message}")]
    InvalidValue {
        /// Description of the problem.
        message: String,
    },

    /// Failed to encode a frame.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a frame.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },
}

impl CodecError {
    /// Create a not enough memory error.
    pub fn not_enough_memory(requested: usize) -> Self {
        Self::NotEnoughMemory { requested }
    }

    /// Create an invalid value error.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Returns the protocol code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotEnoughMemory { .. } => ErrorCode::NOT_ENOUGH_MEMORY,
            Self::TypeMismatch { .. } | Self::InvalidValue { .. } => ErrorCode::INVALID_PARAMETER,
            Self::UnsupportedType(_) => ErrorCode::NO_SUPPORT,
            Self::EncodingFailed { .. } | Self::DecodingFailed { .. } => ErrorCode::CALL_FAILED,
        }
    }
}
