//! Store entry ids (versions 0 and 1).
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! v0: flags[4] store_guid[16] version=0 u32 type u16 reserved u16 local_id u32 server_path\0 pad
//! v1: flags[4] store_guid[16] version=1 u32 type u16 id_flags u16 object_guid[16] server_path\0 pad
//! ```
//!
//! These bytes are persisted by callers; offsets must never move.

use crate::error::{EntryIdError, EntryIdResult};
use crate::reader::{dynamic_len, push_trailing_string, trailing_string, ByteReader};
use crate::types::ObjectType;
use uuid::Uuid;

/// Length of a version 0 store id without its trailing server path.
pub const STORE_V0_FIXED_LEN: usize = 32;

/// Length of a version 1 store id without its trailing server path.
pub const STORE_V1_FIXED_LEN: usize = 44;

/// Offset of the version field shared by store and address-book ids.
pub const VERSION_OFFSET: usize = 20;

/// Version-specific part of a store entry id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Version 0: numeric object id.
    V0 {
        /// Reserved field, preserved as read.
        reserved: u16,
        /// Server-local object id.
        local_id: u32,
    },
    /// Version 1: object GUID.
    V1 {
        /// Per-id flags.
        id_flags: u16,
        /// Globally unique object id.
        object_guid: Uuid,
    },
}

/// A decoded store entry id borrowing its server path from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreEntryId<'a> {
    flags: [u8; 4],
    store_guid: Uuid,
    object_type: u16,
    key: StoreKey,
    server_path: &'a [u8],
}

impl<'a> StoreEntryId<'a> {
    /// Creates a version 0 store id.
    pub fn v0(store_guid: Uuid, object_type: ObjectType, local_id: u32) -> Self {
        Self {
            flags: [0; 4],
            store_guid,
            object_type: object_type.code() as u16,
            key: StoreKey::V0 {
                reserved: 0,
                local_id,
            },
            server_path: &[],
        }
    }

    /// Creates a version 1 store id.
    pub fn v1(store_guid: Uuid, object_type: ObjectType, object_guid: Uuid) -> Self {
        Self {
            flags: [0; 4],
            store_guid,
            object_type: object_type.code() as u16,
            key: StoreKey::V1 {
                id_flags: 0,
                object_guid,
            },
            server_path: &[],
        }
    }

    /// Creates a store id from raw parts.
    pub fn from_parts(
        flags: [u8; 4],
        store_guid: Uuid,
        object_type: u16,
        key: StoreKey,
        server_path: &'a [u8],
    ) -> Self {
        Self {
            flags,
            store_guid,
            object_type,
            key,
            server_path,
        }
    }

    /// Returns a copy carrying `server_path`.
    #[must_use]
    pub fn with_server_path<'b>(self, server_path: &'b [u8]) -> StoreEntryId<'b> {
        StoreEntryId {
            flags: self.flags,
            store_guid: self.store_guid,
            object_type: self.object_type,
            key: self.key,
            server_path,
        }
    }

    /// Returns a copy with the given flags.
    #[must_use]
    pub fn with_flags(mut self, flags: [u8; 4]) -> Self {
        self.flags = flags;
        self
    }

    /// Decodes a store id.
    pub fn decode(bytes: &'a [u8]) -> EntryIdResult<Self> {
        let mut reader = ByteReader::new(bytes, "store", STORE_V0_FIXED_LEN)?;
        let flags = reader.read_array::<4>()?;
        let store_guid = reader.read_guid()?;
        let version = reader.read_u32()?;
        let object_type = reader.read_u16()?;

        let key = match version {
            0 => {
                let reserved = reader.read_u16()?;
                let local_id = reader.read_u32()?;
                StoreKey::V0 { reserved, local_id }
            }
            1 => {
                if bytes.len() < STORE_V1_FIXED_LEN {
                    return Err(EntryIdError::truncated(
                        "store v1",
                        STORE_V1_FIXED_LEN,
                        bytes.len(),
                    ));
                }
                let id_flags = reader.read_u16()?;
                let object_guid = reader.read_guid()?;
                StoreKey::V1 {
                    id_flags,
                    object_guid,
                }
            }
            version => return Err(EntryIdError::UnrecognizedVersion { version }),
        };

        Ok(Self {
            flags,
            store_guid,
            object_type,
            key,
            server_path: trailing_string(reader.rest()),
        })
    }

    /// Encodes to the dynamic (padded, NUL-terminated) form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(dynamic_len(self.fixed_len(), self.server_path.len()));
        self.encode_fixed_into(&mut buf);
        push_trailing_string(&mut buf, self.server_path);
        buf
    }

    /// Encodes only the fixed part, for sentinel constants.
    ///
    /// The result is exactly four bytes shorter than `encode()` of the same
    /// id with an empty server path.
    pub fn encode_fixed(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.fixed_len());
        self.encode_fixed_into(&mut buf);
        buf
    }

    fn encode_fixed_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.flags);
        buf.extend_from_slice(self.store_guid.as_bytes());
        buf.extend_from_slice(&self.version().to_le_bytes());
        buf.extend_from_slice(&self.object_type.to_le_bytes());
        match self.key {
            StoreKey::V0 { reserved, local_id } => {
                buf.extend_from_slice(&reserved.to_le_bytes());
                buf.extend_from_slice(&local_id.to_le_bytes());
            }
            StoreKey::V1 {
                id_flags,
                object_guid,
            } => {
                buf.extend_from_slice(&id_flags.to_le_bytes());
                buf.extend_from_slice(object_guid.as_bytes());
            }
        }
    }

    /// Length of the fixed part for this version.
    pub fn fixed_len(&self) -> usize {
        match self.key {
            StoreKey::V0 { .. } => STORE_V0_FIXED_LEN,
            StoreKey::V1 { .. } => STORE_V1_FIXED_LEN,
        }
    }

    /// Returns the version field.
    pub fn version(&self) -> u32 {
        match self.key {
            StoreKey::V0 { .. } => 0,
            StoreKey::V1 { .. } => 1,
        }
    }

    /// Returns the leading flags.
    pub fn flags(&self) -> [u8; 4] {
        self.flags
    }

    /// Returns the store GUID.
    pub fn store_guid(&self) -> Uuid {
        self.store_guid
    }

    /// Returns the raw object type.
    pub fn raw_object_type(&self) -> u16 {
        self.object_type
    }

    /// Returns the object type, if known.
    pub fn object_type(&self) -> Option<ObjectType> {
        ObjectType::from_code(u32::from(self.object_type))
    }

    /// Returns the version-specific key.
    pub fn key(&self) -> StoreKey {
        self.key
    }

    /// Returns the local id of a version 0 id.
    pub fn local_id(&self) -> Option<u32> {
        match self.key {
            StoreKey::V0 { local_id, .. } => Some(local_id),
            StoreKey::V1 { .. } => None,
        }
    }

    /// Returns the object GUID of a version 1 id.
    pub fn object_guid(&self) -> Option<Uuid> {
        match self.key {
            StoreKey::V1 { object_guid, .. } => Some(object_guid),
            StoreKey::V0 { .. } => None,
        }
    }

    /// Returns the trailing server path (without terminator).
    pub fn server_path(&self) -> &'a [u8] {
        self.server_path
    }

    /// Returns true if both ids name the same object, ignoring flags and server path.
    pub fn same_object(&self, other: &StoreEntryId<'_>) -> bool {
        self.store_guid == other.store_guid
            && self.object_type == other.object_type
            && match (self.key, other.key) {
                (StoreKey::V0 { local_id: a, .. }, StoreKey::V0 { local_id: b, .. }) => a == b,
                (StoreKey::V1 { object_guid: a, .. }, StoreKey::V1 { object_guid: b, .. }) => {
                    a == b
                }
                _ => false,
            }
    }
}

/// Rewrites the server path of a store id, for routing through another server.
pub fn with_server_path(bytes: &[u8], server_path: &[u8]) -> EntryIdResult<Vec<u8>> {
    if server_path.contains(&0) {
        return Err(EntryIdError::invalid("server path contains NUL"));
    }
    let id = StoreEntryId::decode(bytes)?;
    Ok(id.with_server_path(server_path).encode())
}
