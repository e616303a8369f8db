//! Local state of one remote object and its children.

use crate::cache::PropertyCache;
use crate::delta::{DeltaOptions, ObjectDelta, ObjectSnapshot};
use crate::entry::EntryState;
use crate::error::{CoreError, CoreResult};
use crate::handler::{HandlerTable, PropertyHandler};
use crate::types::{ChildKey, LocalId, ServerId, SingleInstanceRef};
use mapisync_codec::{Prop, PropTag, PropertyValue};
use mapisync_entryid::ObjectType;
use std::collections::BTreeMap;
use tracing::trace;

/// In-memory state of a remote object.
///
/// Holds the property cache, the pending deletions, an ordered list of
/// children, an optional single-instance reference and the server id.
#[derive(Debug, Clone)]
pub struct ObjectState {
    object_type: ObjectType,
    entry_id: Vec<u8>,
    local_id: LocalId,
    server_id: ServerId,
    cache: PropertyCache,
    handlers: HandlerTable,
    children: Vec<ObjectState>,
    instance: Option<SingleInstanceRef>,
    instance_dirty: bool,
    deleted: bool,
    changed: bool,
    loaded: bool,
    next_local_id: u32,
}

impl ObjectState {
    /// Creates a new object unknown to the server.
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            entry_id: Vec::new(),
            local_id: LocalId::default(),
            server_id: ServerId::UNSAVED,
            cache: PropertyCache::new(),
            handlers: HandlerTable::with_defaults(object_type),
            children: Vec::new(),
            instance: None,
            instance_dirty: false,
            deleted: false,
            changed: true,
            loaded: false,
            next_local_id: 1,
        }
    }

    /// Creates the empty state of an existing object, ready to be opened.
    pub fn existing(object_type: ObjectType, entry_id: Vec<u8>) -> Self {
        Self {
            entry_id,
            changed: false,
            ..Self::new(object_type)
        }
    }

    /// Builds the state of an object from a server snapshot.
    pub fn from_snapshot(snapshot: ObjectSnapshot) -> CoreResult<Self> {
        let mut state = Self::existing(snapshot.object_type, Vec::new());
        state.local_id = snapshot.local_id;
        state.apply_snapshot(snapshot)?;
        Ok(state)
    }

    /// Object type.
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Entry id, empty until known.
    pub fn entry_id(&self) -> &[u8] {
        &self.entry_id
    }

    /// Sets the entry id.
    pub fn set_entry_id(&mut self, entry_id: Vec<u8>) {
        self.entry_id = entry_id;
    }

    /// Local id within the parent.
    pub fn local_id(&self) -> LocalId {
        self.local_id
    }

    /// Key within the parent.
    pub fn key(&self) -> ChildKey {
        ChildKey::new(self.object_type, self.local_id)
    }

    /// Server id, zero until the first save.
    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Property cache.
    pub fn cache(&self) -> &PropertyCache {
        &self.cache
    }

    /// Handler table, for registering additional computed properties.
    pub fn handlers_mut(&mut self) -> &mut HandlerTable {
        &mut self.handlers
    }

    /// Single-instance reference, if any.
    pub fn instance(&self) -> Option<&SingleInstanceRef> {
        self.instance.as_ref()
    }

    /// Returns true once marked for deletion.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns true once populated by a load.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Returns true if no load and no local edit has touched this state.
    pub fn is_pristine(&self) -> bool {
        !self.loaded && self.cache.is_empty() && self.children.is_empty()
    }

    /// Reads a property through its handler.
    pub fn get_prop(&self, tag: PropTag) -> CoreResult<PropertyValue> {
        match self.handlers.get(tag) {
            PropertyHandler::Computed { get, .. } => {
                let value = get(tag, self)?;
                if !tag.prop_type().accepts(value.prop_type()) {
                    return Err(CoreError::not_found(tag));
                }
                Ok(value.coerce_to(tag.prop_type()))
            }
            PropertyHandler::Ignored => Err(CoreError::not_found(tag)),
            PropertyHandler::Stored => self.cache.get(tag),
        }
    }

    /// Writes a property through its handler.
    pub fn set_prop(&mut self, prop: &Prop) -> CoreResult<()> {
        self.ensure_live()?;
        match self.handlers.get(prop.tag) {
            PropertyHandler::Computed { set: Some(set), .. } => set(self, prop),
            PropertyHandler::Computed { set: None, .. } => {
                Err(CoreError::Computed { tag: prop.tag })
            }
            PropertyHandler::Ignored => Ok(()),
            PropertyHandler::Stored => {
                self.cache.set(prop.tag, &prop.value)?;
                self.changed = true;
                Ok(())
            }
        }
    }

    /// Deletes a property through its handler.
    pub fn delete_prop(&mut self, tag: PropTag) -> CoreResult<()> {
        self.ensure_live()?;
        match self.handlers.get(tag) {
            PropertyHandler::Computed { .. } => Err(CoreError::Computed { tag }),
            PropertyHandler::Ignored => Ok(()),
            PropertyHandler::Stored => {
                self.cache.delete(tag)?;
                self.changed = true;
                Ok(())
            }
        }
    }

    /// Lists cached tags merged with computed ones.
    pub fn list_tags(&self) -> Vec<PropTag> {
        self.cache.list_tags(&self.handlers)
    }

    /// Stores a demand-loaded value. The tag must be in the available state.
    pub fn complete_demand_load(&mut self, prop: &Prop) -> CoreResult<()> {
        if self.cache.state(prop.tag) != Some(EntryState::Available) {
            return Err(CoreError::not_found(prop.tag));
        }
        if let Some(code) = prop.as_error() {
            return Err(CoreError::invalid_operation(format!(
                "server returned {code} for {}",
                prop.tag
            )));
        }
        self.cache.insert_loaded(prop)
    }

    /// Points this object at an existing single-instance payload.
    pub fn set_instance(&mut self, instance: SingleInstanceRef) -> CoreResult<()> {
        self.ensure_live()?;
        self.instance = Some(instance);
        self.instance_dirty = true;
        self.changed = true;
        Ok(())
    }

    /// Adds a new child and returns it.
    ///
    /// Fails with `InvalidOperation` once the local id space is exhausted.
    pub fn add_child(&mut self, object_type: ObjectType) -> CoreResult<&mut ObjectState> {
        let local_id = LocalId(self.next_local_id);
        let next = self.next_local_id.checked_add(1).ok_or_else(|| {
            CoreError::invalid_operation(format!("{} has no local ids left", self.key()))
        })?;
        let mut child = ObjectState::new(object_type);
        child.local_id = local_id;
        self.next_local_id = next;
        self.children.push(child);
        let last = self.children.len() - 1;
        Ok(&mut self.children[last])
    }

    /// Returns the live child with `key`.
    pub fn child(&self, key: ChildKey) -> Option<&ObjectState> {
        self.children
            .iter()
            .find(|child| !child.deleted && child.key() == key)
    }

    /// Returns the live child with `key`, mutably.
    pub fn child_mut(&mut self, key: ChildKey) -> Option<&mut ObjectState> {
        self.children
            .iter_mut()
            .find(|child| !child.deleted && child.key() == key)
    }

    /// Iterates over live children in insertion order.
    pub fn children(&self) -> impl Iterator<Item = &ObjectState> {
        self.children.iter().filter(|child| !child.deleted)
    }

    /// Marks the child with `key` and all its descendants deleted.
    pub fn delete_child(&mut self, key: ChildKey) -> CoreResult<()> {
        self.ensure_live()?;
        let child = self
            .child_mut(key)
            .ok_or_else(|| CoreError::object_not_found(format!("child {key}")))?;
        child.mark_deleted();
        Ok(())
    }

    /// Marks this object and its descendants deleted.
    ///
    /// Pending edits are discarded so the deletion is never sent as a
    /// content change.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.changed = false;
        self.instance_dirty = false;
        self.cache.mark_clean();
        for child in &mut self.children {
            child.mark_deleted();
        }
    }

    /// Returns true if a save would send anything.
    pub fn has_pending_changes(&self) -> bool {
        !self.deleted
            && (self.changed
                || self.instance_dirty
                || self.cache.is_dirty()
                || self.children.iter().any(is_sent))
    }

    /// Builds the differential save payload.
    ///
    /// Deleted children are sent only if the server knows them; live
    /// children only if they carry changes.
    pub fn build_delta(&self, opts: &DeltaOptions) -> ObjectDelta {
        let mut delta = ObjectDelta {
            object_type: self.object_type,
            local_id: self.local_id,
            server_id: self.server_id,
            entry_id: self.entry_id.clone(),
            deleted: self.deleted,
            deleted_tags: Vec::new(),
            modified: Vec::new(),
            children: Vec::new(),
            instance: None,
            instance_body: None,
        };
        if self.deleted {
            return delta;
        }

        delta.deleted_tags = self.cache.deleted_tags();
        delta.modified = self.cache.dirty_props();
        if self.instance_dirty {
            delta.instance = self.instance.clone();
        }
        if opts.single_instance {
            let large = delta.modified.iter().position(|prop| {
                prop.tag.id() == opts.instance_tag.id()
                    && prop
                        .value
                        .as_bytes()
                        .is_some_and(|body| body.len() >= opts.instance_threshold)
            });
            if let Some(index) = large {
                let prop = delta.modified.remove(index);
                if let PropertyValue::Binary(body) = prop.value {
                    delta.instance = Some(SingleInstanceRef::from_content(prop.tag, &body));
                    if opts.include_instance_body {
                        delta.instance_body = Some(body);
                    }
                }
            }
        }
        delta.children = self
            .children
            .iter()
            .filter(|child| is_sent(child))
            .map(|child| child.build_delta(opts))
            .collect();
        delta
    }

    /// Replaces the whole state with a server snapshot.
    ///
    /// Children, pending deletions and dirty flags are discarded. Nothing is
    /// modified if the snapshot cannot be applied.
    pub fn apply_snapshot(&mut self, snapshot: ObjectSnapshot) -> CoreResult<()> {
        let mut cache = PropertyCache::new();
        for tag in &snapshot.tags_available {
            cache.insert_available(*tag);
        }
        for prop in &snapshot.props {
            cache.insert_loaded(prop)?;
        }
        let children = snapshot
            .children
            .into_iter()
            .map(ObjectState::from_snapshot)
            .collect::<CoreResult<Vec<_>>>()?;

        let next_local_id = children
            .iter()
            .map(|child| child.key())
            .try_fold(1u32, |next, key| local_id_after(key).map(|after| next.max(after)))?;

        self.next_local_id = next_local_id;
        self.cache = cache;
        self.children = children;
        self.server_id = snapshot.server_id;
        if !snapshot.entry_id.is_empty() {
            self.entry_id = snapshot.entry_id;
        }
        self.instance = snapshot.instance;
        self.instance_dirty = false;
        self.deleted = false;
        self.changed = false;
        self.loaded = true;
        Ok(())
    }

    /// Merges the server's answer to a save.
    ///
    /// Available tags never demote loaded values. Deleted children are
    /// dropped; the rest are matched to child snapshots by key.
    ///
    /// Every live child that was new before the save must come back with a
    /// server id; otherwise a later deletion of it could never be sent.
    pub fn merge_saved(&mut self, snapshot: ObjectSnapshot) -> CoreResult<()> {
        let mut next_local_id = self.next_local_id;
        for child in &snapshot.children {
            next_local_id = next_local_id.max(local_id_after(child.key())?);
        }
        if snapshot.server_id.is_known() {
            self.server_id = snapshot.server_id;
        }
        if !snapshot.entry_id.is_empty() {
            self.entry_id = snapshot.entry_id;
        }
        self.cache.mark_clean();
        for tag in &snapshot.tags_available {
            self.cache.insert_available(*tag);
        }
        for prop in &snapshot.props {
            self.cache.insert_loaded(prop)?;
        }
        if snapshot.instance.is_some() {
            self.instance = snapshot.instance;
        }
        self.instance_dirty = false;
        self.changed = false;
        self.loaded = true;

        let dropped = self.children.iter().filter(|child| child.deleted).count();
        if dropped > 0 {
            trace!(object = %self.key(), dropped, "dropping deleted children");
        }
        self.children.retain(|child| !child.deleted);
        let mut returned: BTreeMap<ChildKey, ObjectSnapshot> = snapshot
            .children
            .into_iter()
            .map(|child| (child.key(), child))
            .collect();
        for child in &mut self.children {
            match returned.remove(&child.key()) {
                Some(child_snapshot) => child.merge_saved(child_snapshot)?,
                None => child.mark_saved()?,
            }
            child.require_server_id()?;
        }
        for (_, child_snapshot) in returned {
            self.children.push(ObjectState::from_snapshot(child_snapshot)?);
        }
        self.next_local_id = next_local_id;
        Ok(())
    }

    /// Clears all pending bookkeeping after a save the server acknowledged
    /// without returning this object.
    ///
    /// Fails if this object or a live descendant never received a server id.
    pub fn mark_saved(&mut self) -> CoreResult<()> {
        self.require_server_id()?;
        self.cache.mark_clean();
        self.instance_dirty = false;
        self.changed = false;
        self.children.retain(|child| !child.deleted);
        for child in &mut self.children {
            child.mark_saved()?;
        }
        Ok(())
    }

    fn require_server_id(&self) -> CoreResult<()> {
        if self.server_id.is_known() {
            return Ok(());
        }
        Err(CoreError::invalid_parameter(format!(
            "save answer carries no server id for {}",
            self.key()
        )))
    }

    fn ensure_live(&self) -> CoreResult<()> {
        if self.deleted {
            return Err(CoreError::invalid_operation(format!(
                "{} {} is deleted",
                self.object_type, self.local_id
            )));
        }
        Ok(())
    }
}

/// Returns the local id that follows `key`'s, rejecting the last one.
fn local_id_after(key: ChildKey) -> CoreResult<u32> {
    key.local_id.as_u32().checked_add(1).ok_or_else(|| {
        CoreError::invalid_parameter(format!("child {key} has an out-of-range local id"))
    })
}

/// A child goes into the save payload if it has changes, or if it was
/// deleted after the server learned about it.
fn is_sent(child: &ObjectState) -> bool {
    if child.deleted {
        child.server_id.is_known()
    } else {
        child.has_pending_changes()
    }
}
