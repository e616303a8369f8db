//! Property tags and types.
//!
//! A tag packs a 16-bit property id and a 16-bit type code: `(id << 16) | type`.
//! The cache keys entries by id alone; the type only matters for
//! compatibility checks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A property type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropType(pub u16);

impl PropType {
    /// Type not specified; matches any stored type.
    pub const UNSPECIFIED: Self = Self(0x0000);
    /// No value.
    pub const NULL: Self = Self(0x0001);
    /// 16-bit signed integer.
    pub const I2: Self = Self(0x0002);
    /// 32-bit signed integer.
    pub const LONG: Self = Self(0x0003);
    /// 32-bit float.
    pub const R4: Self = Self(0x0004);
    /// 64-bit float.
    pub const DOUBLE: Self = Self(0x0005);
    /// Currency, a 64-bit fixed point value.
    pub const CURRENCY: Self = Self(0x0006);
    /// Application time, a 64-bit float.
    pub const APPTIME: Self = Self(0x0007);
    /// Error code standing in for a value.
    pub const ERROR: Self = Self(0x000A);
    /// Boolean.
    pub const BOOLEAN: Self = Self(0x000B);
    /// 64-bit signed integer.
    pub const I8: Self = Self(0x0014);
    /// Narrow (code page) text.
    pub const STRING8: Self = Self(0x001E);
    /// Wide text.
    pub const UNICODE: Self = Self(0x001F);
    /// 64-bit file time.
    pub const SYSTIME: Self = Self(0x0040);
    /// 16-byte GUID.
    pub const CLSID: Self = Self(0x0048);
    /// Restriction tree.
    pub const SRESTRICTION: Self = Self(0x00FD);
    /// Rule action list.
    pub const ACTIONS: Self = Self(0x00FE);
    /// Opaque bytes.
    pub const BINARY: Self = Self(0x0102);

    /// Multi-value flag.
    pub const MV_FLAG: u16 = 0x1000;

    /// Multi-valued 16-bit integers.
    pub const MV_I2: Self = Self::I2.multi();
    /// Multi-valued 32-bit integers.
    pub const MV_LONG: Self = Self::LONG.multi();
    /// Multi-valued 32-bit floats.
    pub const MV_R4: Self = Self::R4.multi();
    /// Multi-valued 64-bit floats.
    pub const MV_DOUBLE: Self = Self::DOUBLE.multi();
    /// Multi-valued currency.
    pub const MV_CURRENCY: Self = Self::CURRENCY.multi();
    /// Multi-valued application time.
    pub const MV_APPTIME: Self = Self::APPTIME.multi();
    /// Multi-valued 64-bit integers.
    pub const MV_I8: Self = Self::I8.multi();
    /// Multi-valued narrow text.
    pub const MV_STRING8: Self = Self::STRING8.multi();
    /// Multi-valued wide text.
    pub const MV_UNICODE: Self = Self::UNICODE.multi();
    /// Multi-valued file times.
    pub const MV_SYSTIME: Self = Self::SYSTIME.multi();
    /// Multi-valued GUIDs.
    pub const MV_CLSID: Self = Self::CLSID.multi();
    /// Multi-valued binary.
    pub const MV_BINARY: Self = Self::BINARY.multi();

    /// Returns the multi-valued form of this type.
    pub const fn multi(self) -> Self {
        Self(self.0 | Self::MV_FLAG)
    }

    /// Returns the single-valued base type.
    pub const fn base(self) -> Self {
        Self(self.0 & !Self::MV_FLAG)
    }

    /// Returns true for multi-valued types.
    pub const fn is_multi(self) -> bool {
        self.0 & Self::MV_FLAG != 0
    }

    /// Returns true for narrow or wide text, single or multi.
    pub fn is_text(self) -> bool {
        matches!(self.base(), Self::STRING8 | Self::UNICODE)
    }

    /// Collapses narrow and wide text into one family.
    fn family(self) -> Self {
        match self {
            Self::STRING8 => Self::UNICODE,
            Self::MV_STRING8 => Self::MV_UNICODE,
            other => other,
        }
    }

    /// Returns true if a value stored as `stored` satisfies a request for `self`.
    pub fn accepts(self, stored: PropType) -> bool {
        self == Self::UNSPECIFIED || self.family() == stored.family()
    }
}

impl fmt::Display for PropType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// A property tag: id and type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropTag(pub u32);

impl PropTag {
    /// Builds a tag from id and type.
    pub const fn new(id: u16, ty: PropType) -> Self {
        Self(((id as u32) << 16) | ty.0 as u32)
    }

    /// Returns the property id.
    pub const fn id(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Returns the property type.
    pub const fn prop_type(self) -> PropType {
        PropType((self.0 & 0xFFFF) as u16)
    }

    /// Returns the same id with another type.
    #[must_use]
    pub const fn with_type(self, ty: PropType) -> Self {
        Self::new(self.id(), ty)
    }

    /// Returns the raw value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true if a value stored under `stored` satisfies a request for this tag.
    pub fn accepts(self, stored: PropTag) -> bool {
        self.id() == stored.id() && self.prop_type().accepts(stored.prop_type())
    }
}

impl fmt::Display for PropTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Well-known property tags.
pub mod tags {
    use super::{PropTag, PropType};

    /// Placeholder tag; ignored on write.
    pub const PR_NULL: PropTag = PropTag::new(0x0000, PropType::NULL);
    /// Entry id of the object.
    pub const PR_ENTRYID: PropTag = PropTag::new(0x0FFF, PropType::BINARY);
    /// Object type code.
    pub const PR_OBJECT_TYPE: PropTag = PropTag::new(0x0FFE, PropType::LONG);
    /// Store entry id.
    pub const PR_STORE_ENTRYID: PropTag = PropTag::new(0x0FFB, PropType::BINARY);
    /// Record key.
    pub const PR_RECORD_KEY: PropTag = PropTag::new(0x0FF9, PropType::BINARY);
    /// Parent folder entry id.
    pub const PR_PARENT_ENTRYID: PropTag = PropTag::new(0x0E09, PropType::BINARY);
    /// Message size.
    pub const PR_MESSAGE_SIZE: PropTag = PropTag::new(0x0E08, PropType::LONG);
    /// Subject.
    pub const PR_SUBJECT: PropTag = PropTag::new(0x0037, PropType::UNICODE);
    /// Plain-text body.
    pub const PR_BODY: PropTag = PropTag::new(0x1000, PropType::UNICODE);
    /// Display name.
    pub const PR_DISPLAY_NAME: PropTag = PropTag::new(0x3001, PropType::UNICODE);
    /// Email address.
    pub const PR_EMAIL_ADDRESS: PropTag = PropTag::new(0x3003, PropType::UNICODE);
    /// Ambiguous name resolution search key; compared by prefix.
    pub const PR_ANR: PropTag = PropTag::new(0x360C, PropType::UNICODE);
    /// Attachment contents.
    pub const PR_ATTACH_DATA_BIN: PropTag = PropTag::new(0x3701, PropType::BINARY);
    /// Attachment number.
    pub const PR_ATTACH_NUM: PropTag = PropTag::new(0x0E21, PropType::LONG);
    /// Recipient row id.
    pub const PR_ROWID: PropTag = PropTag::new(0x3000, PropType::LONG);
    /// Row count of a contents table.
    pub const PR_CONTENT_COUNT: PropTag = PropTag::new(0x3602, PropType::LONG);
    /// Last modification time.
    pub const PR_LAST_MODIFICATION_TIME: PropTag = PropTag::new(0x3008, PropType::SYSTIME);
    /// Message flags.
    pub const PR_MESSAGE_FLAGS: PropTag = PropTag::new(0x0E07, PropType::LONG);
    /// Lowest id of the named-property range.
    pub const NAMED_PROP_BASE: u16 = 0x8000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_packing() {
        let tag = PropTag::new(0x3001, PropType::UNICODE);
        assert_eq!(tag.as_u32(), 0x3001_001F);
        assert_eq!(tag.id(), 0x3001);
        assert_eq!(tag.prop_type(), PropType::UNICODE);
        assert_eq!(tag.with_type(PropType::STRING8).as_u32(), 0x3001_001E);
    }

    #[test]
    fn multi_value_flag() {
        assert_eq!(PropType::MV_BINARY.0, 0x1102);
        assert!(PropType::MV_LONG.is_multi());
        assert_eq!(PropType::MV_LONG.base(), PropType::LONG);
        assert!(PropType::MV_STRING8.is_text());
        assert!(!PropType::BINARY.is_text());
    }

    #[test]
    fn text_family_compatibility() {
        assert!(PropType::STRING8.accepts(PropType::UNICODE));
        assert!(PropType::UNICODE.accepts(PropType::STRING8));
        assert!(PropType::MV_STRING8.accepts(PropType::MV_UNICODE));
        assert!(!PropType::UNICODE.accepts(PropType::MV_UNICODE));
        assert!(!PropType::LONG.accepts(PropType::I8));
        assert!(PropType::UNSPECIFIED.accepts(PropType::BINARY));
    }

    #[test]
    fn tag_compatibility_needs_same_id() {
        let subject8 = tags::PR_SUBJECT.with_type(PropType::STRING8);
        assert!(subject8.accepts(tags::PR_SUBJECT));
        assert!(!tags::PR_BODY.accepts(tags::PR_SUBJECT));
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(tags::PR_ENTRYID.to_string(), "0x0FFF0102");
        assert_eq!(PropType::BINARY.to_string(), "0x0102");
    }
}
