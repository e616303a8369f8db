//! Object sync engine.
//!
//! One engine owns the local state of one remote object and its children.
//! Every public operation holds the engine's re-entrant lock for its whole
//! duration, so a call made from inside another call on the same thread
//! never deadlocks. The state itself sits in a `RefCell`: a nested call that
//! needs the state mutably while an outer call is reading it gets
//! [`EngineError::Reentrant`] instead.

use crate::config::TableConfig;
use crate::error::{EngineError, EngineResult};
use crate::session::{EngineStats, Session};
use crate::table::TableOpBatcher;
use crate::transport::RpcTransport;
use mapisync_codec::{ErrorCode, Prop, PropTag, PropType, PropertyValue};
use mapisync_core::{
    ChildKey, CoreError, DeltaOptions, EntryState, ObjectDelta, ObjectState, PropReadable,
    PropWritable, PropertyHandler, ServerId, SingleInstance, TableHost,
};
use mapisync_entryid::{decode, EntryIdView, ObjectType};
use mapisync_protocol::{
    LoadObjectRequest, LoadPropRequest, RpcRequest, SaveObjectRequest, WireSnapshot,
};
use parking_lot::ReentrantMutex;
use std::cell::{Ref, RefCell, RefMut};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Access mode of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Writes and saves fail with `NoAccess`.
    ReadOnly,
    /// Full access.
    ReadWrite,
}

/// Result of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The server accepted the payload and assigned this id.
    Saved(ServerId),
    /// Nothing was pending; no call was made.
    NoChanges,
}

/// Overall status of a multi-property read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every slot holds a value.
    Complete,
    /// At least one slot holds an error.
    Partial,
}

/// Answer to a multi-property read: one slot per requested tag.
#[derive(Debug, Clone, PartialEq)]
pub struct PropBatch {
    /// Values or error slots, in request order.
    pub props: Vec<Prop>,
    /// Overall status.
    pub status: BatchStatus,
}

impl PropBatch {
    /// Returns the protocol status of the batch.
    pub fn code(&self) -> ErrorCode {
        match self.status {
            BatchStatus::Complete => ErrorCode::SUCCESS,
            BatchStatus::Partial => ErrorCode::ERRORS_RETURNED,
        }
    }

    /// Returns true if any slot holds an error.
    pub fn is_partial(&self) -> bool {
        self.status == BatchStatus::Partial
    }

    /// Indices of the error slots.
    pub fn error_slots(&self) -> Vec<usize> {
        self.props
            .iter()
            .enumerate()
            .filter(|(_, prop)| prop.as_error().is_some())
            .map(|(index, _)| index)
            .collect()
    }
}

/// A per-property failure of a multi-property write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropProblem {
    /// Index in the request.
    pub index: usize,
    /// Tag that failed.
    pub tag: PropTag,
    /// Failure.
    pub code: ErrorCode,
}

/// Capabilities an engine offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// [`PropReadable`]; always present.
    pub readable: bool,
    /// [`PropWritable`]; absent on read-only engines.
    pub writable: bool,
    /// [`SingleInstance`]; attachments only.
    pub single_instance: bool,
    /// [`TableHost`]; objects with tables only.
    pub table_host: bool,
}

/// Synchronises one object with the server.
pub struct ObjectSyncEngine<T: RpcTransport> {
    session: Arc<Session<T>>,
    mode: OpenMode,
    parent_entry_id: Vec<u8>,
    state: ReentrantMutex<RefCell<ObjectState>>,
}

fn borrow(cell: &RefCell<ObjectState>) -> EngineResult<Ref<'_, ObjectState>> {
    cell.try_borrow().map_err(|_| EngineError::Reentrant)
}

fn borrow_mut(cell: &RefCell<ObjectState>) -> EngineResult<RefMut<'_, ObjectState>> {
    cell.try_borrow_mut().map_err(|_| EngineError::Reentrant)
}

/// Object type named by an entry id.
fn object_type_of(entry_id: &[u8]) -> EngineResult<ObjectType> {
    let object_type = match decode(entry_id)?.innermost()? {
        EntryIdView::Store(store) => store.object_type(),
        EntryIdView::AddressBook(ab) => ab.object_type(),
        EntryIdView::Empty | EntryIdView::Wrapped(_) => None,
    };
    object_type.ok_or_else(|| {
        EngineError::from(CoreError::invalid_parameter(
            "entry id does not name an object type",
        ))
    })
}

impl<T: RpcTransport> ObjectSyncEngine<T> {
    /// Wraps existing object state.
    pub fn new(session: Arc<Session<T>>, state: ObjectState, mode: OpenMode) -> Self {
        Self {
            session,
            mode,
            parent_entry_id: Vec::new(),
            state: ReentrantMutex::new(RefCell::new(state)),
        }
    }

    /// Creates an engine for a new object under `parent_entry_id`.
    pub fn create(
        session: Arc<Session<T>>,
        object_type: ObjectType,
        parent_entry_id: Vec<u8>,
    ) -> Self {
        Self::new(session, ObjectState::new(object_type), OpenMode::ReadWrite)
            .with_parent(parent_entry_id)
    }

    /// Creates an engine for an existing object. Call [`open`](Self::open)
    /// before use.
    pub fn for_entry(
        session: Arc<Session<T>>,
        object_type: ObjectType,
        entry_id: Vec<u8>,
        mode: OpenMode,
    ) -> Self {
        Self::new(session, ObjectState::existing(object_type, entry_id), mode)
    }

    /// Opens the object named by `entry_id`, taking its type from the id.
    pub fn open_entry(
        session: Arc<Session<T>>,
        entry_id: Vec<u8>,
        mode: OpenMode,
    ) -> EngineResult<Self> {
        let object_type = object_type_of(&entry_id)?;
        let engine = Self::for_entry(session, object_type, entry_id, mode);
        engine.open()?;
        Ok(engine)
    }

    /// Sets the parent entry id sent with saves.
    #[must_use]
    pub fn with_parent(mut self, parent_entry_id: Vec<u8>) -> Self {
        self.parent_entry_id = parent_entry_id;
        self
    }

    /// Returns the session.
    pub fn session(&self) -> &Arc<Session<T>> {
        &self.session
    }

    /// Gets the session stats.
    pub fn stats(&self) -> EngineStats {
        self.session.stats()
    }

    /// Returns the access mode.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Returns true if the engine was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.mode == OpenMode::ReadOnly
    }

    /// Runs `f` over the object state.
    pub fn inspect<R>(&self, f: impl FnOnce(&ObjectState) -> R) -> EngineResult<R> {
        let guard = self.state.lock();
        let state = borrow(&guard)?;
        Ok(f(&state))
    }

    fn update<R>(&self, f: impl FnOnce(&mut ObjectState) -> EngineResult<R>) -> EngineResult<R> {
        let guard = self.state.lock();
        let mut state = borrow_mut(&guard)?;
        f(&mut state)
    }

    fn ensure_writable(&self) -> EngineResult<()> {
        match self.mode {
            OpenMode::ReadOnly => Err(EngineError::NoAccess),
            OpenMode::ReadWrite => Ok(()),
        }
    }

    /// Returns the object type.
    pub fn object_type(&self) -> EngineResult<ObjectType> {
        self.inspect(ObjectState::object_type)
    }

    /// Returns the server id.
    pub fn server_id(&self) -> EngineResult<ServerId> {
        self.inspect(ObjectState::server_id)
    }

    /// Returns the entry id.
    pub fn entry_id(&self) -> EngineResult<Vec<u8>> {
        self.inspect(|state| state.entry_id().to_vec())
    }

    /// Returns true if a save would send anything.
    pub fn has_pending_changes(&self) -> EngineResult<bool> {
        self.inspect(ObjectState::has_pending_changes)
    }

    /// Builds the payload the next save would send.
    pub fn pending_delta(&self) -> EngineResult<ObjectDelta> {
        let opts = self.delta_options();
        self.inspect(|state| state.build_delta(&opts))
    }

    /// Registers a property handler on the object.
    pub fn register_handler(&self, tag: PropTag, handler: PropertyHandler) -> EngineResult<()> {
        self.update(|state| {
            state.handlers_mut().register(tag, handler);
            Ok(())
        })
    }

    fn delta_options(&self) -> DeltaOptions {
        let config = self.session.config();
        DeltaOptions::default()
            .with_single_instance(config.single_instance)
            .with_instance_threshold(config.instance_threshold)
    }

    // ---- load ------------------------------------------------------------

    /// First load of a freshly constructed engine.
    ///
    /// Fails with `InvalidState` if the object already holds any state; use
    /// [`reload`](Self::reload) to discard local edits deliberately.
    pub fn open(&self) -> EngineResult<()> {
        let guard = self.state.lock();
        if !borrow(&guard)?.is_pristine() {
            return Err(EngineError::invalid_state("object already holds state"));
        }
        self.load_locked(&guard)
    }

    /// Replaces the local state with the server's, discarding unsaved edits.
    pub fn reload(&self) -> EngineResult<()> {
        let guard = self.state.lock();
        self.load_locked(&guard)
    }

    fn load_locked(&self, cell: &RefCell<ObjectState>) -> EngineResult<()> {
        let entry_id = borrow(cell)?.entry_id().to_vec();
        if entry_id.is_empty() {
            return Err(EngineError::invalid_state("object has no entry id"));
        }
        let request = RpcRequest::LoadObject(LoadObjectRequest::new(
            entry_id,
            self.session.config().max_inline_size,
        ));
        let snapshot = self.session.call(&request)?.into_object()?.to_snapshot()?;
        debug!(
            server_id = %snapshot.server_id,
            values = snapshot.props.len(),
            available = snapshot.tags_available.len(),
            children = snapshot.children.len(),
            "object loaded"
        );
        borrow_mut(cell)?.apply_snapshot(snapshot)?;
        self.session.record(|s| s.loads += 1);
        Ok(())
    }

    /// Fetches one property that is known but not loaded.
    ///
    /// Fails with `NotFound` if the tag is not in the available state.
    pub fn demand_load(&self, tag: PropTag) -> EngineResult<()> {
        let guard = self.state.lock();
        self.demand_load_locked(&guard, tag)
    }

    fn demand_load_locked(&self, cell: &RefCell<ObjectState>, tag: PropTag) -> EngineResult<()> {
        let (server_id, request_tag) = {
            let state = borrow(cell)?;
            let entry = state
                .cache()
                .entry(tag)
                .filter(|entry| entry.state() == EntryState::Available)
                .ok_or_else(|| CoreError::not_found(tag))?;
            let stored = entry.tag();
            let request_tag = if stored.prop_type() == PropType::UNSPECIFIED {
                tag
            } else {
                stored
            };
            (state.server_id(), request_tag)
        };

        let request = RpcRequest::LoadProp(LoadPropRequest::new(server_id, request_tag));
        let prop = self.session.call(&request)?.into_prop()?.prop();
        if let Some(code) = prop.as_error() {
            return Err(EngineError::server("load_prop", code));
        }
        trace!(tag = %request_tag, bytes = prop.value.size(), "demand loaded");
        borrow_mut(cell)?.complete_demand_load(&prop)?;
        self.session.record(|s| s.demand_loads += 1);
        Ok(())
    }

    // ---- properties --------------------------------------------------------

    /// Reads one property, demand-loading it if needed.
    pub fn get_prop(&self, tag: PropTag) -> EngineResult<PropertyValue> {
        let guard = self.state.lock();
        let first = borrow(&guard)?.get_prop(tag);
        match first {
            Err(CoreError::DemandLoadRequired { .. }) => {}
            other => return other.map_err(EngineError::from),
        }
        self.demand_load_locked(&guard, tag)?;
        let value = borrow(&guard)?.get_prop(tag)?;
        Ok(value)
    }

    /// Reads several properties without demand loading.
    ///
    /// Every tag gets a slot. A failing tag gets an error slot with its code
    /// (`NOT_ENOUGH_MEMORY` for values that need a demand load) and the batch
    /// is marked partial. An empty tag list reads every tag.
    pub fn get_props(&self, tags: &[PropTag]) -> EngineResult<PropBatch> {
        self.inspect(|state| {
            let all;
            let tags = if tags.is_empty() {
                all = state.list_tags();
                &all[..]
            } else {
                tags
            };
            let props: Vec<Prop> = tags
                .iter()
                .map(|&tag| match state.get_prop(tag) {
                    Ok(value) => Prop::new(tag.with_type(value.prop_type()), value),
                    Err(err) => Prop::error(tag, err.code()),
                })
                .collect();
            let status = if props.iter().any(|prop| prop.as_error().is_some()) {
                BatchStatus::Partial
            } else {
                BatchStatus::Complete
            };
            PropBatch { props, status }
        })
    }

    /// Lists the tags the object exposes.
    pub fn list_tags(&self) -> EngineResult<Vec<PropTag>> {
        self.inspect(ObjectState::list_tags)
    }

    /// Writes one property.
    pub fn set_prop(&self, prop: &Prop) -> EngineResult<()> {
        self.ensure_writable()?;
        self.update(|state| Ok(state.set_prop(prop)?))
    }

    /// Writes several properties, collecting per-property failures.
    pub fn set_props(&self, props: &[Prop]) -> EngineResult<Vec<PropProblem>> {
        self.ensure_writable()?;
        self.update(|state| {
            Ok(props
                .iter()
                .enumerate()
                .filter_map(|(index, prop)| {
                    state.set_prop(prop).err().map(|err| PropProblem {
                        index,
                        tag: prop.tag,
                        code: err.code(),
                    })
                })
                .collect())
        })
    }

    /// Deletes one property.
    pub fn delete_prop(&self, tag: PropTag) -> EngineResult<()> {
        self.ensure_writable()?;
        self.update(|state| Ok(state.delete_prop(tag)?))
    }

    /// Deletes several properties, collecting per-property failures.
    pub fn delete_props(&self, tags: &[PropTag]) -> EngineResult<Vec<PropProblem>> {
        self.ensure_writable()?;
        self.update(|state| {
            Ok(tags
                .iter()
                .enumerate()
                .filter_map(|(index, &tag)| {
                    state.delete_prop(tag).err().map(|err| PropProblem {
                        index,
                        tag,
                        code: err.code(),
                    })
                })
                .collect())
        })
    }

    // ---- children ----------------------------------------------------------

    /// Adds a new child object.
    pub fn create_child(&self, object_type: ObjectType) -> EngineResult<ChildKey> {
        self.ensure_writable()?;
        self.update(|state| Ok(state.add_child(object_type)?.key()))
    }

    /// Marks a child and its descendants deleted.
    pub fn delete_child(&self, key: ChildKey) -> EngineResult<()> {
        self.ensure_writable()?;
        self.update(|state| Ok(state.delete_child(key)?))
    }

    /// Keys of the live children.
    pub fn children(&self) -> EngineResult<Vec<ChildKey>> {
        self.inspect(|state| state.children().map(ObjectState::key).collect())
    }

    /// Runs `f` over a live child.
    pub fn with_child<R>(
        &self,
        key: ChildKey,
        f: impl FnOnce(&ObjectState) -> R,
    ) -> EngineResult<R> {
        let guard = self.state.lock();
        let state = borrow(&guard)?;
        let child = state
            .child(key)
            .ok_or_else(|| CoreError::object_not_found(format!("child {key}")))?;
        Ok(f(child))
    }

    /// Runs `f` over a live child, mutably.
    pub fn with_child_mut<R>(
        &self,
        key: ChildKey,
        f: impl FnOnce(&mut ObjectState) -> Result<R, CoreError>,
    ) -> EngineResult<R> {
        self.ensure_writable()?;
        self.update(|state| {
            let child = state
                .child_mut(key)
                .ok_or_else(|| CoreError::object_not_found(format!("child {key}")))?;
            Ok(f(child)?)
        })
    }

    // ---- save --------------------------------------------------------------

    /// Sends pending changes to the server and merges its answer.
    ///
    /// Read-only engines fail with `NoAccess` before any call. Nothing is
    /// sent if nothing is pending on an object the server already knows. A
    /// save rejected for an unknown single-instance reference is resent once
    /// with the payload. The local state changes only if the save succeeds.
    pub fn save(&self) -> EngineResult<SaveOutcome> {
        self.ensure_writable()?;
        let guard = self.state.lock();
        let (pending, known) = {
            let state = borrow(&guard)?;
            (state.has_pending_changes(), state.server_id().is_known())
        };
        if !pending && known {
            debug!("nothing to save");
            self.session.record(|s| s.saves_skipped += 1);
            return Ok(SaveOutcome::NoChanges);
        }

        let opts = self.delta_options();
        let delta = borrow(&guard)?.build_delta(&opts);
        let response = match self.send_save(&guard, &delta) {
            Err(err) if err.is_unknown_instance() && delta.has_instance() => {
                warn!("server does not hold the instance, resending with payload");
                self.session.record(|s| s.instance_retries += 1);
                let delta = borrow(&guard)?.build_delta(&opts.with_instance_body(true));
                self.send_save(&guard, &delta)?
            }
            other => other?,
        };

        let mut merged = borrow(&guard)?.clone();
        merged.merge_saved(response.to_snapshot()?)?;
        let server_id = merged.server_id();
        *borrow_mut(&guard)? = merged;
        self.session.record(|s| s.saves += 1);
        debug!(%server_id, "object saved");
        Ok(SaveOutcome::Saved(server_id))
    }

    fn send_save(
        &self,
        cell: &RefCell<ObjectState>,
        delta: &ObjectDelta,
    ) -> EngineResult<WireSnapshot> {
        let entry_id = borrow(cell)?.entry_id().to_vec();
        let request = RpcRequest::SaveObject(SaveObjectRequest::new(
            entry_id,
            self.parent_entry_id.clone(),
            delta,
        )?);
        debug!(
            modified = delta.modified.len(),
            deleted = delta.deleted_tags.len(),
            children = delta.children.len(),
            instance_body = delta.instance_body.is_some(),
            "saving object"
        );
        Ok(self.session.call(&request)?.into_object()?)
    }

    // ---- capabilities ------------------------------------------------------

    /// Reports the capabilities this engine offers.
    pub fn capabilities(&self) -> EngineResult<Capabilities> {
        self.inspect(|state| Capabilities {
            readable: true,
            writable: !self.is_read_only(),
            single_instance: state.object_type() == ObjectType::Attachment,
            table_host: state.as_table_host().is_some(),
        })
    }

    /// Runs `f` with the read capability.
    pub fn as_readable<R>(&self, f: impl FnOnce(&dyn PropReadable) -> R) -> EngineResult<R> {
        self.inspect(|state| f(state.as_readable()))
    }

    /// Runs `f` with the write capability. Read-only engines have none.
    pub fn as_writable<R>(&self, f: impl FnOnce(&mut dyn PropWritable) -> R) -> EngineResult<R> {
        self.ensure_writable()?;
        self.update(|state| Ok(f(state.as_writable())))
    }

    /// Runs `f` with the single-instance capability.
    pub fn as_single_instance<R>(
        &self,
        f: impl FnOnce(&mut dyn SingleInstance) -> R,
    ) -> EngineResult<R> {
        self.ensure_writable()?;
        self.update(|state| {
            let object_type = state.object_type();
            let capability = state.as_single_instance().ok_or_else(|| {
                EngineError::NoSupport(format!("single instance on {object_type}"))
            })?;
            Ok(f(capability))
        })
    }

    /// Runs `f` with the table capability.
    pub fn as_table_host<R>(&self, f: impl FnOnce(&dyn TableHost) -> R) -> EngineResult<R> {
        let guard = self.state.lock();
        let state = borrow(&guard)?;
        let host = state.as_table_host().ok_or_else(|| {
            EngineError::NoSupport(format!("tables on {}", state.object_type()))
        })?;
        Ok(f(host))
    }

    /// Creates a batcher for one of the object's tables.
    ///
    /// The table is opened on the server lazily, by the first call that
    /// reaches it.
    pub fn open_table(&self, config: TableConfig) -> EngineResult<TableOpBatcher<T>> {
        let hosted = self.as_table_host(|host| host.hosts(config.kind))?;
        let (object_type, server_id) =
            self.inspect(|state| (state.object_type(), state.server_id()))?;
        if !hosted {
            return Err(EngineError::NoSupport(format!(
                "{} table on {object_type}",
                config.kind
            )));
        }
        if !server_id.is_known() {
            return Err(EngineError::invalid_state(
                "object must be saved before opening tables",
            ));
        }
        Ok(TableOpBatcher::new(Arc::clone(&self.session), server_id, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::transport::MockTransport;
    use mapisync_codec::{marshal, tags};
    use mapisync_core::{LocalId, ObjectSnapshot, TableKind};
    use mapisync_entryid::StoreEntryId;
    use mapisync_protocol::{LoadPropResponse, RpcResponse};
    use uuid::Uuid;

    const STORE: Uuid = Uuid::from_u128(0x1111_2222_3333_4444_5555_6666_7777_8888);

    fn message_id(local: u32) -> Vec<u8> {
        StoreEntryId::v0(STORE, ObjectType::Message, local).encode()
    }

    fn session() -> Arc<Session<MockTransport>> {
        Session::connect(EngineConfig::new("alice"), MockTransport::new()).unwrap()
    }

    fn loaded_message(server_id: u32) -> WireSnapshot {
        let mut snapshot = ObjectSnapshot::new(ObjectType::Message, ServerId(server_id));
        snapshot.entry_id = message_id(server_id);
        snapshot.tags_available = vec![tags::PR_BODY];
        snapshot.props = vec![
            Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode("hello".into())),
            Prop::new(tags::PR_MESSAGE_FLAGS, PropertyValue::Long(1)),
        ];
        WireSnapshot::from_snapshot(&snapshot).unwrap()
    }

    fn saved(server_id: u32) -> RpcResponse {
        let mut snapshot = ObjectSnapshot::new(ObjectType::Message, ServerId(server_id));
        snapshot.entry_id = message_id(server_id);
        RpcResponse::Object(WireSnapshot::from_snapshot(&snapshot).unwrap())
    }

    fn opened(session: &Arc<Session<MockTransport>>, mode: OpenMode) -> ObjectSyncEngine<MockTransport> {
        session
            .transport()
            .push_response(RpcResponse::Object(loaded_message(7)));
        ObjectSyncEngine::open_entry(Arc::clone(session), message_id(7), mode).unwrap()
    }

    #[test]
    fn open_infers_type_and_loads() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadWrite);
        assert_eq!(engine.object_type().unwrap(), ObjectType::Message);
        assert_eq!(engine.server_id().unwrap(), ServerId(7));
        assert_eq!(
            engine.get_prop(tags::PR_SUBJECT).unwrap(),
            PropertyValue::Unicode("hello".into())
        );
        assert_eq!(engine.stats().loads, 1);
    }

    #[test]
    fn open_twice_is_rejected() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadWrite);
        assert!(matches!(engine.open(), Err(EngineError::InvalidState(_))));
    }

    #[test]
    fn reload_discards_local_edits() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadWrite);
        engine
            .set_prop(&Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode("draft".into())))
            .unwrap();
        session
            .transport()
            .push_response(RpcResponse::Object(loaded_message(7)));
        engine.reload().unwrap();
        assert!(!engine.has_pending_changes().unwrap());
        assert_eq!(
            engine.get_prop(tags::PR_SUBJECT).unwrap(),
            PropertyValue::Unicode("hello".into())
        );
    }

    #[test]
    fn single_get_demand_loads() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadOnly);
        let body = Prop::new(tags::PR_BODY, PropertyValue::Unicode("long body".into()));
        session
            .transport()
            .push_response(RpcResponse::Prop(LoadPropResponse::new(&body).unwrap()));

        assert_eq!(engine.get_prop(tags::PR_BODY).unwrap(), body.value);
        assert_eq!(engine.stats().demand_loads, 1);

        // already loaded: a second demand load is refused locally
        let err = engine.demand_load(tags::PR_BODY).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NOT_FOUND);
    }

    #[test]
    fn multi_get_reports_slots() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadOnly);
        let batch = engine
            .get_props(&[tags::PR_SUBJECT, tags::PR_BODY, tags::PR_DISPLAY_NAME])
            .unwrap();
        assert_eq!(batch.props.len(), 3);
        assert!(batch.is_partial());
        assert_eq!(batch.code(), ErrorCode::ERRORS_RETURNED);
        assert_eq!(batch.error_slots(), vec![1, 2]);
        assert_eq!(batch.props[1].as_error(), Some(ErrorCode::NOT_ENOUGH_MEMORY));
        assert_eq!(batch.props[2].as_error(), Some(ErrorCode::NOT_FOUND));
    }

    #[test]
    fn demand_load_error_slot_surfaces() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadOnly);
        let slot = Prop::error(tags::PR_BODY, ErrorCode::NOT_FOUND);
        session.transport().push_response(RpcResponse::Prop(LoadPropResponse {
            value: marshal(&slot).unwrap(),
        }));
        let err = engine.demand_load(tags::PR_BODY).unwrap_err();
        assert_eq!(err, EngineError::server("load_prop", ErrorCode::NOT_FOUND));
    }

    #[test]
    fn read_only_refuses_writes_without_calling() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadOnly);
        let calls = session.transport().calls().len();

        let prop = Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode("x".into()));
        assert_eq!(engine.set_prop(&prop).unwrap_err(), EngineError::NoAccess);
        assert_eq!(engine.save().unwrap_err(), EngineError::NoAccess);
        assert_eq!(
            engine.as_writable(|_| ()).unwrap_err(),
            EngineError::NoAccess
        );
        assert!(!engine.capabilities().unwrap().writable);
        assert_eq!(session.transport().calls().len(), calls);
    }

    #[test]
    fn set_props_collects_problems() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadWrite);
        let problems = engine
            .set_props(&[
                Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode("a".into())),
                Prop::new(tags::PR_ENTRYID, PropertyValue::Binary(vec![1])),
                Prop::new(tags::PR_MESSAGE_FLAGS, PropertyValue::Unicode("bad".into())),
            ])
            .unwrap();
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].index, 1);
        assert_eq!(problems[0].code, ErrorCode::COMPUTED);
        assert_eq!(problems[1].index, 2);
        assert_eq!(problems[1].code, ErrorCode::INVALID_PARAMETER);

        let problems = engine
            .delete_props(&[tags::PR_SUBJECT, tags::PR_DISPLAY_NAME])
            .unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].tag, tags::PR_DISPLAY_NAME);
    }

    #[test]
    fn save_sends_delta_and_merges() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadWrite);
        engine
            .set_prop(&Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode("edited".into())))
            .unwrap();
        engine.delete_prop(tags::PR_MESSAGE_FLAGS).unwrap();
        session.transport().push_response(saved(7));

        assert_eq!(engine.save().unwrap(), SaveOutcome::Saved(ServerId(7)));
        let requests = session.transport().requests();
        let RpcRequest::SaveObject(request) = requests.last().unwrap() else {
            panic!("expected a save");
        };
        assert_eq!(request.delta.modified.len(), 1);
        assert_eq!(
            request.delta.deleted_tags,
            vec![tags::PR_MESSAGE_FLAGS.as_u32()]
        );
        assert!(!engine.has_pending_changes().unwrap());
        assert_eq!(engine.stats().saves, 1);
    }

    #[test]
    fn second_save_is_a_no_op() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadWrite);
        engine
            .set_prop(&Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode("edited".into())))
            .unwrap();
        session.transport().push_response(saved(7));
        engine.save().unwrap();
        let calls = session.transport().calls().len();

        assert!(engine.pending_delta().unwrap().is_empty());
        assert_eq!(engine.save().unwrap(), SaveOutcome::NoChanges);
        assert_eq!(session.transport().calls().len(), calls);
        assert_eq!(engine.stats().saves_skipped, 1);
    }

    #[test]
    fn failed_save_leaves_state_untouched() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadWrite);
        engine
            .set_prop(&Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode("edited".into())))
            .unwrap();
        session.transport().push_error(ErrorCode::NO_ACCESS);

        assert_eq!(engine.save().unwrap_err().code(), ErrorCode::NO_ACCESS);
        assert!(engine.has_pending_changes().unwrap());
        assert_eq!(engine.pending_delta().unwrap().modified.len(), 1);
    }

    #[test]
    fn child_removal_is_never_skipped() {
        let session = session();
        let mut snapshot = ObjectSnapshot::new(ObjectType::Message, ServerId(7));
        snapshot.entry_id = message_id(7);
        let mut attach = ObjectSnapshot::new(ObjectType::Attachment, ServerId(70));
        attach.local_id = LocalId(1);
        snapshot.children = vec![attach];
        session
            .transport()
            .push_response(RpcResponse::Object(WireSnapshot::from_snapshot(&snapshot).unwrap()));
        let engine =
            ObjectSyncEngine::open_entry(Arc::clone(&session), message_id(7), OpenMode::ReadWrite)
                .unwrap();

        let key = engine.children().unwrap()[0];
        engine.delete_child(key).unwrap();
        session.transport().push_response(saved(7));
        assert_eq!(engine.save().unwrap(), SaveOutcome::Saved(ServerId(7)));

        let requests = session.transport().requests();
        let RpcRequest::SaveObject(request) = requests.last().unwrap() else {
            panic!("expected a save");
        };
        assert_eq!(request.delta.children.len(), 1);
        assert!(request.delta.children[0].deleted);
        assert!(engine.children().unwrap().is_empty());
    }

    #[test]
    fn save_answer_without_new_child_is_rejected() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadWrite);
        let key = engine.create_child(ObjectType::Attachment).unwrap();
        session.transport().push_response(saved(7));

        assert_eq!(
            engine.save().unwrap_err().code(),
            ErrorCode::INVALID_PARAMETER
        );
        assert!(engine.has_pending_changes().unwrap());
        assert_eq!(engine.children().unwrap(), vec![key]);
        assert_eq!(engine.pending_delta().unwrap().children.len(), 1);
    }

    #[test]
    fn new_object_gets_server_id() {
        let session = session();
        let engine = ObjectSyncEngine::create(Arc::clone(&session), ObjectType::Message, vec![9; 24]);
        engine
            .set_prop(&Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode("new".into())))
            .unwrap();
        session.transport().push_response(saved(12));
        assert_eq!(engine.save().unwrap(), SaveOutcome::Saved(ServerId(12)));
        assert_eq!(engine.entry_id().unwrap(), message_id(12));

        let requests = session.transport().requests();
        let RpcRequest::SaveObject(request) = &requests[0] else {
            panic!("expected a save");
        };
        assert_eq!(request.parent_entry_id, vec![9; 24]);
        assert!(request.entry_id.is_empty());
    }

    #[test]
    fn nested_mutation_inside_read_is_refused() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadWrite);
        let nested = engine
            .as_readable(|readable| {
                let subject = readable.get_prop(tags::PR_SUBJECT).unwrap();
                let again = engine.get_prop(tags::PR_SUBJECT).unwrap();
                assert_eq!(subject, again);
                engine.set_prop(&Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode("x".into())))
            })
            .unwrap();
        assert_eq!(nested.unwrap_err(), EngineError::Reentrant);
    }

    #[test]
    fn capabilities_follow_object_type() {
        let session = session();
        let engine = opened(&session, OpenMode::ReadWrite);
        let caps = engine.capabilities().unwrap();
        assert!(caps.readable && caps.writable && caps.table_host);
        assert!(!caps.single_instance);
        assert!(matches!(
            engine.as_single_instance(|_| ()),
            Err(EngineError::NoSupport(_))
        ));
        assert!(engine
            .as_table_host(|host| host.hosts(TableKind::Attachments))
            .unwrap());
        assert!(matches!(
            engine.open_table(TableConfig::new(TableKind::Hierarchy)),
            Err(EngineError::NoSupport(_))
        ));
        assert!(engine
            .open_table(TableConfig::new(TableKind::Recipients))
            .is_ok());
    }

    #[test]
    fn tables_need_a_saved_object() {
        let session = session();
        let engine = ObjectSyncEngine::create(Arc::clone(&session), ObjectType::Folder, Vec::new());
        assert!(matches!(
            engine.open_table(TableConfig::new(TableKind::Contents)),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn undecodable_entry_id_is_rejected() {
        let session = session();
        let err = ObjectSyncEngine::open_entry(session, vec![1, 2, 3], OpenMode::ReadOnly)
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::INVALID_ENTRYID);
    }
}
