//! Error types for the property cache and object state.

use mapisync_codec::{CodecError, ErrorCode, PropTag};
use mapisync_entryid::EntryIdError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in cache and object operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The tag or object is unknown.
    #[error("property {tag} not found")]
    NotFound {
        /// Requested tag.
        tag: PropTag,
    },

    /// The property exists but its value has not been fetched.
    #[error("property {tag} must be demand-loaded")]
    DemandLoadRequired {
        /// Requested tag.
        tag: PropTag,
    },

    /// The object is unknown.
    #[error("object not found: {message}")]
    ObjectNotFound {
        /// Description of the lookup.
        message: String,
    },

    /// Malformed caller input.
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the problem.
        message: String,
    },

    /// The object was opened read-only.
    #[error("no access: object is read-only")]
    NoAccess,

    /// Attempt to write a computed property.
    #[error("property {tag} is computed")]
    Computed {
        /// Offending tag.
        tag: PropTag,
    },

    /// Operation not valid in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Value copy or conversion failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Entry id could not be decoded.
    #[error("entry id error: {0}")]
    EntryId(#[from] EntryIdError),
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(tag: PropTag) -> Self {
        Self::NotFound { tag }
    }

    /// Creates an object not found error.
    pub fn object_not_found(message: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            message: message.into(),
        }
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns the protocol code for this error.
    ///
    /// A pending demand load reports `NOT_ENOUGH_MEMORY`, as the server does
    /// for values too large to return inline.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } | Self::ObjectNotFound { .. } => ErrorCode::NOT_FOUND,
            Self::DemandLoadRequired { .. } => ErrorCode::NOT_ENOUGH_MEMORY,
            Self::InvalidParameter { .. } => ErrorCode::INVALID_PARAMETER,
            Self::NoAccess => ErrorCode::NO_ACCESS,
            Self::Computed { .. } => ErrorCode::COMPUTED,
            Self::InvalidOperation { .. } => ErrorCode::CALL_FAILED,
            Self::Codec(err) => err.code(),
            Self::EntryId(_) => ErrorCode::INVALID_ENTRYID,
        }
    }
}
