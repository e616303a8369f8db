//! Save payloads and server snapshots.

use crate::types::{ChildKey, LocalId, ServerId, SingleInstanceRef};
use mapisync_codec::{tags, Prop, PropTag};
use mapisync_entryid::ObjectType;

/// Options for building a save payload.
#[derive(Debug, Clone)]
pub struct DeltaOptions {
    /// Send large values of `instance_tag` as single-instance references.
    pub single_instance: bool,
    /// Property eligible for single-instance storage.
    pub instance_tag: PropTag,
    /// Values at least this large are sent by reference.
    pub instance_threshold: usize,
    /// Include the referenced payload next to the reference.
    pub include_instance_body: bool,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self {
            single_instance: false,
            instance_tag: tags::PR_ATTACH_DATA_BIN,
            instance_threshold: 64 * 1024,
            include_instance_body: false,
        }
    }
}

impl DeltaOptions {
    /// Enables or disables single-instance references.
    #[must_use]
    pub fn with_single_instance(mut self, enabled: bool) -> Self {
        self.single_instance = enabled;
        self
    }

    /// Sets the size from which values are sent by reference.
    #[must_use]
    pub fn with_instance_threshold(mut self, bytes: usize) -> Self {
        self.instance_threshold = bytes;
        self
    }

    /// Requests the payload to be sent alongside the reference.
    #[must_use]
    pub fn with_instance_body(mut self, include: bool) -> Self {
        self.include_instance_body = include;
        self
    }
}

/// Differential save payload for one object and its changed children.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDelta {
    /// Object type.
    pub object_type: ObjectType,
    /// Local id within the parent.
    pub local_id: LocalId,
    /// Server id, zero for new objects.
    pub server_id: ServerId,
    /// Entry id, empty for new objects.
    pub entry_id: Vec<u8>,
    /// True if the object is to be removed.
    pub deleted: bool,
    /// Tags to remove.
    pub deleted_tags: Vec<PropTag>,
    /// Changed values.
    pub modified: Vec<Prop>,
    /// Child payloads.
    pub children: Vec<ObjectDelta>,
    /// Single-instance reference replacing a large value.
    pub instance: Option<SingleInstanceRef>,
    /// Payload of `instance`, only on the retry after an unknown reference.
    pub instance_body: Option<Vec<u8>>,
}

impl ObjectDelta {
    /// Returns the key of this object within its parent.
    pub fn key(&self) -> ChildKey {
        ChildKey::new(self.object_type, self.local_id)
    }

    /// Returns true if the payload carries no change at all.
    pub fn is_empty(&self) -> bool {
        !self.deleted
            && self.deleted_tags.is_empty()
            && self.modified.is_empty()
            && self.children.is_empty()
            && self.instance.is_none()
    }

    /// Returns true if this payload or a child's carries a single-instance reference.
    pub fn has_instance(&self) -> bool {
        self.instance.is_some() || self.children.iter().any(ObjectDelta::has_instance)
    }
}

/// Object contents as reported by the server on load or after a save.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSnapshot {
    /// Object type.
    pub object_type: ObjectType,
    /// Local id within the parent.
    pub local_id: LocalId,
    /// Server id.
    pub server_id: ServerId,
    /// Entry id, empty if not reported.
    pub entry_id: Vec<u8>,
    /// Tags present on the server but not returned.
    pub tags_available: Vec<PropTag>,
    /// Returned values; error slots stand in for values not returned.
    pub props: Vec<Prop>,
    /// Child snapshots.
    pub children: Vec<ObjectSnapshot>,
    /// Single-instance reference, if the object has one.
    pub instance: Option<SingleInstanceRef>,
}

impl ObjectSnapshot {
    /// Creates an empty snapshot.
    pub fn new(object_type: ObjectType, server_id: ServerId) -> Self {
        Self {
            object_type,
            local_id: LocalId::default(),
            server_id,
            entry_id: Vec::new(),
            tags_available: Vec::new(),
            props: Vec::new(),
            children: Vec::new(),
            instance: None,
        }
    }

    /// Returns the key of this object within its parent.
    pub fn key(&self) -> ChildKey {
        ChildKey::new(self.object_type, self.local_id)
    }
}
