//! Numeric status codes used on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A protocol status code.
///
/// Codes with the high bit set are failures; the others are success or
/// warning codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    /// Success.
    pub const SUCCESS: Self = Self(0);
    /// Property or object does not exist.
    pub const NOT_FOUND: Self = Self(0x8004_010F);
    /// Allocation failure, or value too large to return inline.
    pub const NOT_ENOUGH_MEMORY: Self = Self(0x8007_000E);
    /// Malformed argument.
    pub const INVALID_PARAMETER: Self = Self(0x8007_0057);
    /// Object is read-only or access was denied.
    pub const NO_ACCESS: Self = Self(0x8007_0005);
    /// Property is computed and cannot be written.
    pub const COMPUTED: Self = Self(0x8004_011A);
    /// Entry id could not be decoded.
    pub const INVALID_ENTRYID: Self = Self(0x8004_0107);
    /// Transport failure.
    pub const NETWORK_ERROR: Self = Self(0x8004_0115);
    /// Session expired on the server.
    pub const END_OF_SESSION: Self = Self(0x8004_0200);
    /// Server does not know the single-instance reference that was sent.
    pub const UNKNOWN_INSTANCE: Self = Self(0x8004_0120);
    /// Operation not supported.
    pub const NO_SUPPORT: Self = Self(0x8004_0102);
    /// Unspecified failure.
    pub const CALL_FAILED: Self = Self(0x8000_4005);
    /// Warning: the call succeeded but some slots carry errors.
    pub const ERRORS_RETURNED: Self = Self(0x0004_0380);

    /// Returns the raw code.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true for failure codes.
    pub const fn is_failure(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::SUCCESS => "SUCCESS",
            Self::NOT_FOUND => "NOT_FOUND",
            Self::NOT_ENOUGH_MEMORY => "NOT_ENOUGH_MEMORY",
            Self::INVALID_PARAMETER => "INVALID_PARAMETER",
            Self::NO_ACCESS => "NO_ACCESS",
            Self::COMPUTED => "COMPUTED",
            Self::INVALID_ENTRYID => "INVALID_ENTRYID",
            Self::NETWORK_ERROR => "NETWORK_ERROR",
            Self::END_OF_SESSION => "END_OF_SESSION",
            Self::UNKNOWN_INSTANCE => "UNKNOWN_INSTANCE",
            Self::NO_SUPPORT => "NO_SUPPORT",
            Self::CALL_FAILED => "CALL_FAILED",
            Self::ERRORS_RETURNED => "ERRORS_RETURNED",
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_bit() {
        assert!(ErrorCode::NOT_FOUND.is_failure());
        assert!(!ErrorCode::ERRORS_RETURNED.is_failure());
        assert!(!ErrorCode::SUCCESS.is_failure());
    }

    #[test]
    fn display_names_known_codes() {
        assert_eq!(ErrorCode::NOT_FOUND.to_string(), "NOT_FOUND (0x8004010F)");
        assert_eq!(ErrorCode(0x1234).to_string(), "0x00001234");
    }
}
