//! Per-tag property handlers.
//!
//! Every access resolves the tag's id against a [`HandlerTable`]. Computed
//! handlers derive their value from object state instead of the cache.

use crate::error::{CoreError, CoreResult};
use crate::object::ObjectState;
use mapisync_codec::{tags, Prop, PropTag, PropertyValue};
use mapisync_entryid::{EntryIdView, ObjectType};
use std::collections::HashMap;

/// Reads a computed property.
pub type ComputedGetter = fn(PropTag, &ObjectState) -> CoreResult<PropertyValue>;

/// Writes a computed property.
pub type ComputedSetter = fn(&mut ObjectState, &Prop) -> CoreResult<()>;

/// How accesses to a tag are resolved.
#[derive(Debug, Clone, Copy)]
pub enum PropertyHandler {
    /// Value derived from object state. Writes without a setter fail with
    /// `Computed`.
    Computed {
        /// Getter.
        get: ComputedGetter,
        /// Optional setter.
        set: Option<ComputedSetter>,
    },
    /// Plain cached property.
    Stored,
    /// Reads are `NotFound`; writes and deletes succeed without effect.
    Ignored,
}

/// Handlers keyed by property id.
#[derive(Debug, Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<u16, (PropTag, PropertyHandler)>,
}

impl HandlerTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the table every object of `object_type` starts with.
    pub fn with_defaults(object_type: ObjectType) -> Self {
        let mut table = Self::new();
        table.register_computed(tags::PR_ENTRYID, entry_id, None);
        table.register_computed(tags::PR_OBJECT_TYPE, object_type_code, None);
        table.register_computed(tags::PR_RECORD_KEY, record_key, None);
        table.register(tags::PR_NULL, PropertyHandler::Ignored);
        if object_type == ObjectType::Attachment {
            table.register_computed(tags::PR_ATTACH_NUM, attach_num, None);
        }
        table
    }

    /// Registers `handler` for `tag`'s id, replacing any previous one.
    pub fn register(&mut self, tag: PropTag, handler: PropertyHandler) {
        self.handlers.insert(tag.id(), (tag, handler));
    }

    /// Registers a computed handler.
    pub fn register_computed(
        &mut self,
        tag: PropTag,
        get: ComputedGetter,
        set: Option<ComputedSetter>,
    ) {
        self.register(tag, PropertyHandler::Computed { get, set });
    }

    /// Returns the handler for `tag`'s id.
    pub fn get(&self, tag: PropTag) -> PropertyHandler {
        self.handlers
            .get(&tag.id())
            .map_or(PropertyHandler::Stored, |(_, handler)| *handler)
    }

    /// Iterates over the tags that have computed handlers.
    pub fn computed_tags(&self) -> impl Iterator<Item = PropTag> + '_ {
        self.handlers.values().filter_map(|(tag, handler)| match handler {
            PropertyHandler::Computed { .. } => Some(*tag),
            _ => None,
        })
    }
}

fn entry_id(tag: PropTag, state: &ObjectState) -> CoreResult<PropertyValue> {
    if state.entry_id().is_empty() {
        return Err(CoreError::not_found(tag));
    }
    Ok(PropertyValue::Binary(state.entry_id().to_vec()))
}

fn object_type_code(_tag: PropTag, state: &ObjectState) -> CoreResult<PropertyValue> {
    Ok(PropertyValue::Long(state.object_type().code() as i32))
}

/// Stores are keyed by their GUID; everything else by its entry id.
fn record_key(tag: PropTag, state: &ObjectState) -> CoreResult<PropertyValue> {
    if state.entry_id().is_empty() {
        return Err(CoreError::not_found(tag));
    }
    if state.object_type() == ObjectType::Store {
        if let Ok(EntryIdView::Store(id)) = mapisync_entryid::decode(state.entry_id()) {
            return Ok(PropertyValue::Binary(id.store_guid().as_bytes().to_vec()));
        }
    }
    Ok(PropertyValue::Binary(state.entry_id().to_vec()))
}

fn attach_num(_tag: PropTag, state: &ObjectState) -> CoreResult<PropertyValue> {
    Ok(PropertyValue::Long(state.local_id().as_u32() as i32))
}
