//! Error types for the sync engine.

use mapisync_codec::{CodecError, ErrorCode};
use mapisync_core::CoreError;
use mapisync_entryid::EntryIdError;
use mapisync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while talking to the server.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The channel failed before an answer arrived.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// The server rejected a call.
    #[error("{call} failed: {code}")]
    Server {
        /// Call name.
        call: &'static str,
        /// Status returned by the server.
        code: ErrorCode,
    },

    /// The transport is closed.
    #[error("not connected")]
    NotConnected,

    /// The object was opened read-only.
    #[error("no access: object is read-only")]
    NoAccess,

    /// The object does not offer the requested capability.
    #[error("not supported: {0}")]
    NoSupport(String),

    /// Operation not valid in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The object state is already borrowed by the calling thread.
    #[error("object state is in use by an enclosing call")]
    Reentrant,

    /// Cache or object state error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Message conversion error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Value codec error.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Entry id could not be decoded.
    #[error(transparent)]
    EntryId(#[from] EntryIdError),
}

impl EngineError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a server error.
    pub fn server(call: &'static str, code: ErrorCode) -> Self {
        Self::Server { call, code }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Returns the protocol code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport { .. } | Self::NotConnected => ErrorCode::NETWORK_ERROR,
            Self::Server { code, .. } => *code,
            Self::NoAccess => ErrorCode::NO_ACCESS,
            Self::NoSupport(_) => ErrorCode::NO_SUPPORT,
            Self::InvalidState(_) | Self::Reentrant => ErrorCode::CALL_FAILED,
            Self::Core(err) => err.code(),
            Self::Protocol(err) => err.code(),
            Self::Codec(err) => err.code(),
            Self::EntryId(_) => ErrorCode::INVALID_ENTRYID,
        }
    }

    /// Returns true if the session must be re-established before retrying.
    pub fn is_session_lost(&self) -> bool {
        matches!(self.code(), ErrorCode::NETWORK_ERROR | ErrorCode::END_OF_SESSION)
    }

    /// Returns true if the server did not know a single-instance reference.
    pub fn is_unknown_instance(&self) -> bool {
        self.code() == ErrorCode::UNKNOWN_INSTANCE
    }
}
