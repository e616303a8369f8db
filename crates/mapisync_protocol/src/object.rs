//! Object load, save and demand-load messages.

use crate::error::{ProtocolError, ProtocolResult};
use mapisync_codec::{marshal, marshal_all, unmarshal, unmarshal_all, PropTag, WireProp};
use mapisync_core::{LocalId, ObjectDelta, ObjectSnapshot, ServerId, SingleInstanceRef};
use mapisync_entryid::ObjectType;
use serde::{Deserialize, Serialize};

/// Single-instance reference on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireInstance {
    /// Opaque instance id.
    pub instance_id: Vec<u8>,
    /// Payload length.
    pub byte_len: u64,
    /// Property the payload belongs to.
    pub tag: u32,
    /// Payload, sent only when the server asked for it.
    pub body: Option<Vec<u8>>,
}

impl WireInstance {
    /// Converts a reference, attaching `body` if given.
    pub fn from_ref(instance: &SingleInstanceRef, body: Option<Vec<u8>>) -> Self {
        Self {
            instance_id: instance.instance_id.clone(),
            byte_len: instance.byte_len,
            tag: instance.tag.as_u32(),
            body,
        }
    }

    /// Returns the reference without its payload.
    pub fn to_ref(&self) -> SingleInstanceRef {
        SingleInstanceRef::new(self.instance_id.clone(), self.byte_len, PropTag(self.tag))
    }
}

/// Object contents as returned by load and save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSnapshot {
    /// Object type code.
    pub object_type: u32,
    /// Local id within the parent.
    pub local_id: u32,
    /// Server object id.
    pub server_id: u32,
    /// Entry id.
    pub entry_id: Vec<u8>,
    /// Tags present but not returned.
    pub tags_available: Vec<u32>,
    /// Returned values.
    pub props: Vec<WireProp>,
    /// Child objects.
    pub children: Vec<WireSnapshot>,
    /// Single-instance reference.
    pub instance: Option<WireInstance>,
}

impl WireSnapshot {
    /// Converts a snapshot to wire form.
    pub fn from_snapshot(snapshot: &ObjectSnapshot) -> ProtocolResult<Self> {
        Ok(Self {
            object_type: snapshot.object_type.code(),
            local_id: snapshot.local_id.as_u32(),
            server_id: snapshot.server_id.as_u32(),
            entry_id: snapshot.entry_id.clone(),
            tags_available: snapshot.tags_available.iter().map(|t| t.as_u32()).collect(),
            props: marshal_all(&snapshot.props)?,
            children: snapshot
                .children
                .iter()
                .map(WireSnapshot::from_snapshot)
                .collect::<ProtocolResult<_>>()?,
            instance: snapshot
                .instance
                .as_ref()
                .map(|instance| WireInstance::from_ref(instance, None)),
        })
    }

    /// Converts to a snapshot.
    ///
    /// Values whose discriminant disagrees with their tag become error slots.
    pub fn to_snapshot(&self) -> ProtocolResult<ObjectSnapshot> {
        Ok(ObjectSnapshot {
            object_type: object_type(self.object_type)?,
            local_id: LocalId(self.local_id),
            server_id: ServerId(self.server_id),
            entry_id: self.entry_id.clone(),
            tags_available: self.tags_available.iter().copied().map(PropTag).collect(),
            props: unmarshal_all(&self.props),
            children: self
                .children
                .iter()
                .map(WireSnapshot::to_snapshot)
                .collect::<ProtocolResult<_>>()?,
            instance: self.instance.as_ref().map(WireInstance::to_ref),
        })
    }
}

/// Differential save payload on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDelta {
    /// Object type code.
    pub object_type: u32,
    /// Local id within the parent.
    pub local_id: u32,
    /// Server object id, zero for new objects.
    pub server_id: u32,
    /// Entry id, empty for new objects.
    pub entry_id: Vec<u8>,
    /// True if the object is removed.
    pub deleted: bool,
    /// Tags to remove.
    pub deleted_tags: Vec<u32>,
    /// Changed values.
    pub modified: Vec<WireProp>,
    /// Child payloads.
    pub children: Vec<WireDelta>,
    /// Single-instance reference.
    pub instance: Option<WireInstance>,
}

impl WireDelta {
    /// Converts a save payload to wire form.
    pub fn from_delta(delta: &ObjectDelta) -> ProtocolResult<Self> {
        Ok(Self {
            object_type: delta.object_type.code(),
            local_id: delta.local_id.as_u32(),
            server_id: delta.server_id.as_u32(),
            entry_id: delta.entry_id.clone(),
            deleted: delta.deleted,
            deleted_tags: delta.deleted_tags.iter().map(|t| t.as_u32()).collect(),
            modified: marshal_all(&delta.modified)?,
            children: delta
                .children
                .iter()
                .map(WireDelta::from_delta)
                .collect::<ProtocolResult<_>>()?,
            instance: delta
                .instance
                .as_ref()
                .map(|instance| WireInstance::from_ref(instance, delta.instance_body.clone())),
        })
    }

    /// Converts back to a save payload.
    pub fn to_delta(&self) -> ProtocolResult<ObjectDelta> {
        Ok(ObjectDelta {
            object_type: object_type(self.object_type)?,
            local_id: LocalId(self.local_id),
            server_id: ServerId(self.server_id),
            entry_id: self.entry_id.clone(),
            deleted: self.deleted,
            deleted_tags: self.deleted_tags.iter().copied().map(PropTag).collect(),
            modified: unmarshal_all(&self.modified),
            children: self
                .children
                .iter()
                .map(WireDelta::to_delta)
                .collect::<ProtocolResult<_>>()?,
            instance: self.instance.as_ref().map(WireInstance::to_ref),
            instance_body: self.instance.as_ref().and_then(|i| i.body.clone()),
        })
    }

    /// Returns true if the payload carries no change.
    pub fn is_empty(&self) -> bool {
        !self.deleted
            && self.deleted_tags.is_empty()
            && self.modified.is_empty()
            && self.children.is_empty()
            && self.instance.is_none()
    }
}

fn object_type(code: u32) -> ProtocolResult<ObjectType> {
    ObjectType::from_code(code)
        .ok_or_else(|| ProtocolError::invalid_field("object_type", format!("unknown code {code}")))
}

/// Request to load a whole object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadObjectRequest {
    /// Entry id of the object.
    pub entry_id: Vec<u8>,
    /// Values larger than this are returned as available tags.
    pub max_inline_size: u32,
}

impl LoadObjectRequest {
    /// Creates a load request.
    pub fn new(entry_id: Vec<u8>, max_inline_size: u32) -> Self {
        Self {
            entry_id,
            max_inline_size,
        }
    }
}

/// Request to save an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveObjectRequest {
    /// Entry id of the object, empty for new objects.
    pub entry_id: Vec<u8>,
    /// Entry id of the parent.
    pub parent_entry_id: Vec<u8>,
    /// Changes.
    pub delta: WireDelta,
}

impl SaveObjectRequest {
    /// Creates a save request from a payload.
    pub fn new(entry_id: Vec<u8>, parent_entry_id: Vec<u8>, delta: &ObjectDelta) -> ProtocolResult<Self> {
        Ok(Self {
            entry_id,
            parent_entry_id,
            delta: WireDelta::from_delta(delta)?,
        })
    }
}

/// Request for one large property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadPropRequest {
    /// Server object id.
    pub server_id: u32,
    /// Requested tag.
    pub tag: u32,
}

impl LoadPropRequest {
    /// Creates a demand-load request.
    pub fn new(server_id: ServerId, tag: PropTag) -> Self {
        Self {
            server_id: server_id.as_u32(),
            tag: tag.as_u32(),
        }
    }
}

/// Response to a demand load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadPropResponse {
    /// The value, or an error slot.
    pub value: WireProp,
}

impl LoadPropResponse {
    /// Creates a response from a property.
    pub fn new(prop: &mapisync_codec::Prop) -> ProtocolResult<Self> {
        Ok(Self {
            value: marshal(prop)?,
        })
    }

    /// Returns the property, substituting an error slot on mismatch.
    pub fn prop(&self) -> mapisync_codec::Prop {
        unmarshal(&self.value)
    }
}
