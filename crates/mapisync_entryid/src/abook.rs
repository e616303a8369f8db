//! Address-book entry ids.
//!
//! ```text
//! flags[4] guid[16] version u32 (0|1) type u32 local_id u32 external_id\0 pad
//! ```
//!
//! Version 0 identifies the entry by `local_id`; version 1 by the external
//! id string, `local_id` only caching the server's current mapping.

use crate::error::{EntryIdError, EntryIdResult};
use crate::reader::{dynamic_len, push_trailing_string, trailing_string, ByteReader};
use crate::types::{ObjectType, AB_PROVIDER_GUID};
use std::cmp::Ordering;
use uuid::Uuid;

/// Length of an address-book id without its trailing external id.
pub const AB_FIXED_LEN: usize = 32;

/// A decoded address-book entry id borrowing its external id from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbEntryId<'a> {
    flags: [u8; 4],
    guid: Uuid,
    version: u32,
    object_type: u32,
    local_id: u32,
    external_id: &'a [u8],
}

impl<'a> AbEntryId<'a> {
    /// Creates a version 0 id under the server's address-book provider GUID.
    pub fn v0(object_type: ObjectType, local_id: u32) -> Self {
        Self::new(AB_PROVIDER_GUID, 0, object_type.code(), local_id, &[])
    }

    /// Creates a version 1 id carrying an external id.
    pub fn v1(object_type: ObjectType, local_id: u32, external_id: &'a [u8]) -> Self {
        Self::new(AB_PROVIDER_GUID, 1, object_type.code(), local_id, external_id)
    }

    /// Creates an id from raw parts.
    pub fn new(
        guid: Uuid,
        version: u32,
        object_type: u32,
        local_id: u32,
        external_id: &'a [u8],
    ) -> Self {
        Self {
            flags: [0; 4],
            guid,
            version,
            object_type,
            local_id,
            external_id,
        }
    }

    /// Returns a copy with the given flags.
    #[must_use]
    pub fn with_flags(mut self, flags: [u8; 4]) -> Self {
        self.flags = flags;
        self
    }

    /// Decodes an address-book id.
    pub fn decode(bytes: &'a [u8]) -> EntryIdResult<Self> {
        let mut reader = ByteReader::new(bytes, "address-book", AB_FIXED_LEN)?;
        let flags = reader.read_array::<4>()?;
        let guid = reader.read_guid()?;
        let version = reader.read_u32()?;
        if version > 1 {
            return Err(EntryIdError::UnrecognizedVersion { version });
        }
        let object_type = reader.read_u32()?;
        let local_id = reader.read_u32()?;
        Ok(Self {
            flags,
            guid,
            version,
            object_type,
            local_id,
            external_id: trailing_string(reader.rest()),
        })
    }

    /// Encodes to the dynamic (padded, NUL-terminated) form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(dynamic_len(AB_FIXED_LEN, self.external_id.len()));
        buf.extend_from_slice(&self.fixed_bytes());
        push_trailing_string(&mut buf, self.external_id);
        buf
    }

    /// Returns the fixed form used for sentinel constants.
    pub fn fixed_bytes(&self) -> [u8; AB_FIXED_LEN] {
        let mut out = [0u8; AB_FIXED_LEN];
        out[0..4].copy_from_slice(&self.flags);
        out[4..20].copy_from_slice(self.guid.as_bytes());
        out[20..24].copy_from_slice(&self.version.to_le_bytes());
        out[24..28].copy_from_slice(&self.object_type.to_le_bytes());
        out[28..32].copy_from_slice(&self.local_id.to_le_bytes());
        out
    }

    /// Returns the leading flags.
    pub fn flags(&self) -> [u8; 4] {
        self.flags
    }

    /// Returns the provider GUID.
    pub fn guid(&self) -> Uuid {
        self.guid
    }

    /// Returns the version field.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the raw object type.
    pub fn raw_object_type(&self) -> u32 {
        self.object_type
    }

    /// Returns the object type, if known.
    pub fn object_type(&self) -> Option<ObjectType> {
        ObjectType::from_code(self.object_type)
    }

    /// Returns the server-local id.
    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// Returns the external id (without terminator).
    pub fn external_id(&self) -> &'a [u8] {
        self.external_id
    }

    /// Returns true if both ids name the same address-book entry.
    ///
    /// GUID and type must match; version 0 then compares local ids and
    /// version 1 compares external ids. Ids of different versions never match.
    pub fn same_object(&self, other: &AbEntryId<'_>) -> bool {
        self.compare(other) == Ordering::Equal
    }

    /// Orders two address-book ids by the fields that identify the entry.
    pub fn compare(&self, other: &AbEntryId<'_>) -> Ordering {
        self.guid
            .as_bytes()
            .cmp(other.guid.as_bytes())
            .then(self.version.cmp(&other.version))
            .then(self.object_type.cmp(&other.object_type))
            .then_with(|| {
                if self.version == 0 {
                    self.local_id.cmp(&other.local_id)
                } else {
                    self.external_id.cmp(other.external_id)
                }
            })
    }
}

/// Returns true if `wire` starts with the fixed-form sentinel `fixed`.
///
/// Wire values carry the padded trailing string, so a byte-equality test
/// against a sentinel would always fail; only the common prefix matters.
pub fn matches_fixed_prefix(fixed: &[u8], wire: &[u8]) -> bool {
    wire.len() >= fixed.len() && &wire[..fixed.len()] == fixed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_stable() {
        let id = AbEntryId::new(Uuid::from_bytes([7; 16]), 1, 6, 0x10, b"x");
        let bytes = id.encode();
        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[4..20], &[7; 16]);
        assert_eq!(&bytes[20..24], &[1, 0, 0, 0]);
        assert_eq!(&bytes[24..28], &[6, 0, 0, 0]);
        assert_eq!(&bytes[28..32], &[0x10, 0, 0, 0]);
        assert_eq!(&bytes[32..34], b"x\0");
    }

    #[test]
    fn roundtrip() {
        let id = AbEntryId::v1(ObjectType::DistList, 42, b"cn=team").with_flags([0, 0, 0, 1]);
        let bytes = id.encode();
        assert_eq!(AbEntryId::decode(&bytes).unwrap(), id);
    }

    #[test]
    fn fixed_form_is_four_bytes_shorter() {
        let id = AbEntryId::v0(ObjectType::MailUser, 3);
        assert_eq!(id.fixed_bytes().len() + 4, id.encode().len());
        assert_eq!(AbEntryId::decode(&id.fixed_bytes()).unwrap(), id);
    }

    #[test]
    fn sentinel_matches_dynamic_wire_value() {
        let sentinel = AbEntryId::v0(ObjectType::AbContainer, 1).fixed_bytes();
        let wire = AbEntryId::v0(ObjectType::AbContainer, 1).encode();
        assert_ne!(&sentinel[..], &wire[..]);
        assert!(matches_fixed_prefix(&sentinel, &wire));
        assert!(!matches_fixed_prefix(&sentinel, &wire[..20]));
    }

    #[test]
    fn version_two_rejected() {
        let mut bytes = AbEntryId::v0(ObjectType::MailUser, 3).encode();
        bytes[20] = 2;
        assert_eq!(
            AbEntryId::decode(&bytes),
            Err(EntryIdError::UnrecognizedVersion { version: 2 })
        );
    }

    #[test]
    fn v1_equality_follows_external_id() {
        let guid = Uuid::from_bytes([3; 16]);
        let plain = AbEntryId::new(guid, 1, 6, 7, b"");
        let with_x = AbEntryId::new(guid, 1, 6, 7, b"x");
        let other_plain = AbEntryId::new(guid, 1, 6, 99, b"");
        assert!(!plain.same_object(&with_x));
        assert!(plain.same_object(&other_plain));
    }

    #[test]
    fn v0_equality_follows_local_id() {
        let guid = Uuid::from_bytes([3; 16]);
        let a = AbEntryId::new(guid, 0, 6, 7, b"ignored");
        let b = AbEntryId::new(guid, 0, 6, 7, b"");
        let c = AbEntryId::new(guid, 0, 6, 8, b"");
        assert!(a.same_object(&b));
        assert!(!a.same_object(&c));
        assert_eq!(a.compare(&c), Ordering::Less);
    }
}
