//! Identifier newtypes and single-instance references.

use mapisync_codec::PropTag;
use mapisync_entryid::ObjectType;
use sha2::{Digest, Sha256};
use std::fmt;

/// Object id assigned by the server; zero until the first save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ServerId(pub u32);

impl ServerId {
    /// The id of an object the server has never seen.
    pub const UNSAVED: Self = Self(0);

    /// Creates a new server id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true once the server has assigned an id.
    #[must_use]
    pub const fn is_known(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "srv:{}", self.0)
    }
}

/// Client-local id distinguishing siblings of the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LocalId(pub u32);

impl LocalId {
    /// Creates a new local id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loc:{}", self.0)
    }
}

/// Key identifying a child within its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChildKey {
    /// Child object type.
    pub object_type: ObjectType,
    /// Local id, unique among siblings of that type.
    pub local_id: LocalId,
}

impl ChildKey {
    /// Creates a child key.
    pub fn new(object_type: ObjectType, local_id: LocalId) -> Self {
        Self {
            object_type,
            local_id,
        }
    }
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_type, self.local_id)
    }
}

/// Content-addressed reference to a large value shared between objects.
///
/// The local object holds only the id and length. The payload lives on the
/// server and may be referenced by any number of objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SingleInstanceRef {
    /// Opaque instance id.
    pub instance_id: Vec<u8>,
    /// Length of the referenced payload.
    pub byte_len: u64,
    /// Property the payload belongs to.
    pub tag: PropTag,
}

impl SingleInstanceRef {
    /// Creates a reference from a server-issued id.
    pub fn new(instance_id: Vec<u8>, byte_len: u64, tag: PropTag) -> Self {
        Self {
            instance_id,
            byte_len,
            tag,
        }
    }

    /// Derives the reference for `body` from its SHA-256 digest.
    pub fn from_content(tag: PropTag, body: &[u8]) -> Self {
        let digest = Sha256::digest(body);
        Self {
            instance_id: digest.to_vec(),
            byte_len: body.len() as u64,
            tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapisync_codec::tags;

    #[test]
    fn server_id_unsaved() {
        assert!(!ServerId::UNSAVED.is_known());
        assert!(ServerId::new(7).is_known());
        assert_eq!(ServerId::new(7).to_string(), "srv:7");
    }

    #[test]
    fn child_keys_order_by_type_then_id() {
        let a = ChildKey::new(ObjectType::Message, LocalId(2));
        let b = ChildKey::new(ObjectType::Attachment, LocalId(1));
        let c = ChildKey::new(ObjectType::Attachment, LocalId(3));
        let mut keys = vec![a, c, b];
        keys.sort();
        assert_eq!(keys, vec![a, b, c]);
    }

    #[test]
    fn content_ids_are_stable() {
        let a = SingleInstanceRef::from_content(tags::PR_ATTACH_DATA_BIN, b"payload");
        let b = SingleInstanceRef::from_content(tags::PR_ATTACH_DATA_BIN, b"payload");
        let c = SingleInstanceRef::from_content(tags::PR_ATTACH_DATA_BIN, b"payloaD");
        assert_eq!(a, b);
        assert_ne!(a.instance_id, c.instance_id);
        assert_eq!(a.instance_id.len(), 32);
        assert_eq!(a.byte_len, 7);
    }
}
