//! Protocol error types.

use mapisync_codec::{CodecError, ErrorCode};
use thiserror::Error;

/// Result type for protocol conversions.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while converting or framing messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// A field holds a value outside its domain.
    #[error("invalid field {field}: {message}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// The response does not answer the request that was sent.
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// Expected response kind.
        expected: &'static str,
        /// Received response kind.
        actual: &'static str,
    },

    /// Value or frame codec failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ProtocolError {
    /// Creates an invalid field error.
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }

    /// Returns the protocol code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidField { .. } => ErrorCode::INVALID_PARAMETER,
            Self::UnexpectedResponse { .. } => ErrorCode::CALL_FAILED,
            Self::Codec(err) => err.code(),
        }
    }
}
