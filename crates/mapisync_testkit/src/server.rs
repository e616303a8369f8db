//! In-memory groupware server.
//!
//! `MemoryServer` answers request frames the way a real server would, over
//! a store held in memory. It plugs into the engine through a
//! [`LoopbackChannel`], so tests exercise the full CBOR framing path.
//!
//! Faults can be injected: sessions can be expired, and the next call of a
//! given kind can be made to fail with a chosen code.

use mapisync_codec::{
    marshal, restriction_from_wire, tags, BitMaskOp, Decode, Encode, ErrorCode, Locale,
    Prop, PropTag, PropertyValue, RelOp, Restriction,
};
use mapisync_core::{ObjectDelta, TableKind, SERVER_NAMED_BASE};
use mapisync_engine::{FramedTransport, LoopbackChannel, LoopbackServer};
use mapisync_entryid::{is_same_object, ObjectType, StoreEntryId};
use mapisync_protocol::{
    GetIdsFromNamesRequest, GetIdsFromNamesResponse, GetNamesFromIdsRequest,
    GetNamesFromIdsResponse, LoadObjectRequest, LoadPropRequest, LoadPropResponse, LogonResponse,
    QueryRowsRequest, RequestFrame, ResponseFrame, RestrictionUpdate, RowCountResponse, RowRequest,
    RowSet, RpcRequest, RpcResponse, SaveObjectRequest, SeekOrigin, SeekRowRequest,
    SeekRowResponse, SortKey, SortOrder, TableId, TableMultiRequest, TableMultiResponse,
    TableOpenRequest, TableOpenResponse, WireInstance, WireName, WireSnapshot,
};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};
use uuid::Uuid;

/// Values above this size are returned as available tags by a save.
pub const SAVE_INLINE_LIMIT: u32 = 8 * 1024;

/// Transport type of an engine talking to a [`MemoryServer`].
pub type MemoryTransport = FramedTransport<LoopbackChannel<MemoryServer>>;

type Reply = Result<RpcResponse, ErrorCode>;

/// An object as the server stores it.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object type.
    pub object_type: ObjectType,
    /// Local id within the parent; zero for top-level objects.
    pub local_id: u32,
    /// Server id.
    pub server_id: u32,
    /// Entry id; empty for child objects.
    pub entry_id: Vec<u8>,
    /// Entry id of the containing folder.
    pub parent: Vec<u8>,
    props: BTreeMap<u16, Prop>,
    children: Vec<StoredObject>,
    instance: Option<WireInstance>,
}

impl StoredObject {
    fn new(object_type: ObjectType, local_id: u32, server_id: u32) -> Self {
        Self {
            object_type,
            local_id,
            server_id,
            entry_id: Vec::new(),
            parent: Vec::new(),
            props: BTreeMap::new(),
            children: Vec::new(),
            instance: None,
        }
    }

    /// Returns the stored value under `tag`'s id.
    pub fn prop(&self, tag: PropTag) -> Option<&PropertyValue> {
        self.props.get(&tag.id()).map(|prop| &prop.value)
    }

    /// Returns every stored property.
    pub fn props(&self) -> impl Iterator<Item = &Prop> {
        self.props.values()
    }

    /// Returns the child objects.
    pub fn children(&self) -> &[StoredObject] {
        &self.children
    }

    /// Returns the single-instance reference, if any.
    pub fn instance(&self) -> Option<&WireInstance> {
        self.instance.as_ref()
    }

    fn find(&self, server_id: u32) -> Option<&StoredObject> {
        if self.server_id == server_id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(server_id))
    }

    fn snapshot(&self, max_inline: u32) -> Result<WireSnapshot, ErrorCode> {
        let mut props = Vec::new();
        let mut tags_available = Vec::new();
        for prop in self.props.values() {
            if prop.value.size() > max_inline as usize {
                tags_available.push(prop.tag.as_u32());
            } else {
                props.push(marshal(prop).map_err(|_| ErrorCode::CALL_FAILED)?);
            }
        }
        Ok(WireSnapshot {
            object_type: self.object_type.code(),
            local_id: self.local_id,
            server_id: self.server_id,
            entry_id: self.entry_id.clone(),
            tags_available,
            props,
            children: self
                .children
                .iter()
                .map(|child| child.snapshot(max_inline))
                .collect::<Result<_, _>>()?,
            instance: self.instance.clone(),
        })
    }

    fn row(&self) -> Vec<Prop> {
        let mut row: Vec<Prop> = self.props.values().cloned().collect();
        if self.entry_id.is_empty() {
            row.push(Prop::new(
                tags::PR_ROWID,
                PropertyValue::Long(self.local_id as i32),
            ));
        } else {
            row.push(Prop::new(
                tags::PR_ENTRYID,
                PropertyValue::Binary(self.entry_id.clone()),
            ));
        }
        row
    }
}

#[derive(Debug, Clone)]
struct ServerTable {
    host: u32,
    kind: TableKind,
    flags: u32,
    columns: Option<Vec<PropTag>>,
    restriction: Option<Restriction>,
    sort: Vec<SortKey>,
    position: usize,
}

impl ServerTable {
    fn new(open: &TableOpenRequest) -> Result<Self, ErrorCode> {
        let kind = TableKind::from_code(open.kind).ok_or(ErrorCode::NO_SUPPORT)?;
        Ok(Self {
            host: open.server_id,
            kind,
            flags: open.flags,
            columns: None,
            restriction: None,
            sort: Vec::new(),
            position: 0,
        })
    }
}

struct ServerState {
    store_guid: Uuid,
    root: Vec<u8>,
    next_session: u64,
    sessions: HashSet<u64>,
    next_server_id: u32,
    objects: BTreeMap<u32, StoredObject>,
    instances: HashMap<Vec<u8>, Vec<u8>>,
    names: Vec<WireName>,
    next_table: u32,
    tables: HashMap<u32, ServerTable>,
    faults: Vec<(&'static str, ErrorCode)>,
    calls: Vec<&'static str>,
    locale: Locale,
}

impl ServerState {
    fn new() -> Self {
        let mut state = Self {
            store_guid: Uuid::new_v4(),
            root: Vec::new(),
            next_session: 0,
            sessions: HashSet::new(),
            next_server_id: 1,
            objects: BTreeMap::new(),
            instances: HashMap::new(),
            names: Vec::new(),
            next_table: 0,
            tables: HashMap::new(),
            faults: Vec::new(),
            calls: Vec::new(),
            locale: Locale::invariant(),
        };
        let root = state.insert(ObjectType::Folder, Vec::new(), Vec::new());
        state.root = root;
        state
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_server_id;
        self.next_server_id += 1;
        id
    }

    fn insert(&mut self, object_type: ObjectType, parent: Vec<u8>, props: Vec<Prop>) -> Vec<u8> {
        let server_id = self.allocate();
        let mut object = StoredObject::new(object_type, 0, server_id);
        object.entry_id = StoreEntryId::v0(self.store_guid, object_type, server_id).encode();
        object.parent = parent;
        for prop in props {
            object.props.insert(prop.tag.id(), prop);
        }
        let entry_id = object.entry_id.clone();
        self.objects.insert(server_id, object);
        entry_id
    }

    fn locate(&self, entry_id: &[u8]) -> Option<u32> {
        self.objects
            .values()
            .find(|object| is_same_object(&object.entry_id, entry_id))
            .map(|object| object.server_id)
    }

    fn find(&self, server_id: u32) -> Option<&StoredObject> {
        self.objects
            .values()
            .find_map(|object| object.find(server_id))
    }

    fn take_fault(&mut self, call: &'static str) -> Option<ErrorCode> {
        let index = self.faults.iter().position(|(name, _)| *name == call)?;
        Some(self.faults.remove(index).1)
    }

    fn dispatch(&mut self, frame: RequestFrame) -> Reply {
        let call = frame.request.name();
        self.calls.push(call);
        if let RpcRequest::Logon(_) = frame.request {
            self.next_session += 1;
            let session = self.next_session;
            self.sessions.insert(session);
            debug!(session, "logon");
            return Ok(RpcResponse::Logon(LogonResponse { session }));
        }
        if !self.sessions.contains(&frame.session) {
            return Err(ErrorCode::END_OF_SESSION);
        }
        if let Some(code) = self.take_fault(call) {
            debug!(call, %code, "injected fault");
            return Err(code);
        }

        match frame.request {
            RpcRequest::Logon(_) => Err(ErrorCode::CALL_FAILED),
            RpcRequest::LoadObject(request) => self.load(&request),
            RpcRequest::SaveObject(request) => self.save(&request),
            RpcRequest::LoadProp(request) => self.load_prop(&request),
            RpcRequest::GetIdsFromNames(request) => Ok(self.ids_from_names(&request)),
            RpcRequest::GetNamesFromIds(request) => Ok(self.names_from_ids(&request)),
            RpcRequest::TableOpen(request) => {
                let table_id = self.open_table(&request)?;
                Ok(RpcResponse::TableOpened(TableOpenResponse { table_id }))
            }
            RpcRequest::TableSetColumns(request) => {
                let table = self.table_mut(request.table_id)?;
                table.columns = Some(request.columns.into_iter().map(PropTag).collect());
                Ok(RpcResponse::Done)
            }
            RpcRequest::TableSetRestriction(request) => {
                let restriction = request
                    .restriction
                    .as_ref()
                    .map(restriction_from_wire)
                    .transpose()
                    .map_err(|_| ErrorCode::INVALID_PARAMETER)?;
                let table = self.table_mut(request.table_id)?;
                table.restriction = restriction;
                table.position = 0;
                Ok(RpcResponse::Done)
            }
            RpcRequest::TableSort(request) => {
                let table = self.table_mut(request.table_id)?;
                table.sort = request.keys;
                table.position = 0;
                Ok(RpcResponse::Done)
            }
            RpcRequest::TableQueryRows(request) => self.query_rows(&request),
            RpcRequest::TableSeekRow(request) => self.seek_row(&request),
            RpcRequest::TableGetRowCount(table_id) => {
                let rows = self.table_rows(table_id)?;
                let table = self.table_mut(table_id)?;
                Ok(RpcResponse::RowCount(RowCountResponse {
                    count: rows.len() as u32,
                    position: table.position as u32,
                }))
            }
            RpcRequest::TableMulti(request) => self.table_multi(request),
            RpcRequest::TableClose(table_id) => {
                self.tables
                    .remove(&table_id.as_u32())
                    .ok_or(ErrorCode::NOT_FOUND)?;
                Ok(RpcResponse::Done)
            }
        }
    }

    // ---- objects -----------------------------------------------------------

    fn load(&self, request: &LoadObjectRequest) -> Reply {
        let server_id = self
            .locate(&request.entry_id)
            .ok_or(ErrorCode::NOT_FOUND)?;
        let object = self.objects.get(&server_id).ok_or(ErrorCode::NOT_FOUND)?;
        Ok(RpcResponse::Object(object.snapshot(request.max_inline_size)?))
    }

    fn save(&mut self, request: &SaveObjectRequest) -> Reply {
        let delta = request
            .delta
            .to_delta()
            .map_err(|_| ErrorCode::INVALID_PARAMETER)?;
        let existing = if request.entry_id.is_empty() {
            None
        } else {
            Some(self.locate(&request.entry_id).ok_or(ErrorCode::NOT_FOUND)?)
        };
        check_instances(&delta, &self.instances)?;

        let server_id = match existing {
            Some(server_id) => server_id,
            None => {
                let entry_id =
                    self.insert(delta.object_type, request.parent_entry_id.clone(), Vec::new());
                self.locate(&entry_id).ok_or(ErrorCode::CALL_FAILED)?
            }
        };

        let Self {
            objects,
            next_server_id,
            instances,
            ..
        } = self;
        let object = objects.get_mut(&server_id).ok_or(ErrorCode::NOT_FOUND)?;
        apply_delta(object, &delta, next_server_id, instances);
        let snapshot = object.snapshot(SAVE_INLINE_LIMIT)?;
        if delta.deleted {
            objects.remove(&server_id);
        }
        trace!(server_id, "object saved");
        Ok(RpcResponse::Object(snapshot))
    }

    fn load_prop(&self, request: &LoadPropRequest) -> Reply {
        let object = self.find(request.server_id).ok_or(ErrorCode::NOT_FOUND)?;
        let tag = PropTag(request.tag);
        let prop = object
            .props
            .get(&tag.id())
            .cloned()
            .unwrap_or_else(|| Prop::error(tag, ErrorCode::NOT_FOUND));
        let response = LoadPropResponse::new(&prop).map_err(|_| ErrorCode::CALL_FAILED)?;
        Ok(RpcResponse::Prop(response))
    }

    // ---- names -------------------------------------------------------------

    fn ids_from_names(&mut self, request: &GetIdsFromNamesRequest) -> RpcResponse {
        let mut ids = Vec::with_capacity(request.names.len());
        for name in &request.names {
            let id = match self.names.iter().position(|known| known == name) {
                Some(index) => SERVER_NAMED_BASE + index as u16,
                None if request.create => {
                    self.names.push(name.clone());
                    SERVER_NAMED_BASE + (self.names.len() - 1) as u16
                }
                None => 0,
            };
            ids.push(id);
        }
        RpcResponse::Ids(GetIdsFromNamesResponse { ids })
    }

    fn names_from_ids(&self, request: &GetNamesFromIdsRequest) -> RpcResponse {
        let names = request
            .ids
            .iter()
            .map(|id| {
                id.checked_sub(SERVER_NAMED_BASE)
                    .and_then(|index| self.names.get(index as usize))
                    .cloned()
            })
            .collect();
        RpcResponse::Names(GetNamesFromIdsResponse { names })
    }

    // ---- tables ------------------------------------------------------------

    fn open_table(&mut self, request: &TableOpenRequest) -> Result<TableId, ErrorCode> {
        let host = self.find(request.server_id).ok_or(ErrorCode::NOT_FOUND)?;
        if !host.object_type.hosts_tables() {
            return Err(ErrorCode::NO_SUPPORT);
        }
        let table = ServerTable::new(request)?;
        self.next_table += 1;
        let id = self.next_table;
        self.tables.insert(id, table);
        debug!(table = id, host = request.server_id, "table opened");
        Ok(TableId(id))
    }

    fn table_mut(&mut self, table_id: TableId) -> Result<&mut ServerTable, ErrorCode> {
        self.tables
            .get_mut(&table_id.as_u32())
            .ok_or(ErrorCode::NOT_FOUND)
    }

    /// Rows of a table after restriction and sort, before projection.
    fn table_rows(&self, table_id: TableId) -> Result<Vec<Vec<Prop>>, ErrorCode> {
        let table = self
            .tables
            .get(&table_id.as_u32())
            .ok_or(ErrorCode::NOT_FOUND)?;
        let host = self.find(table.host).ok_or(ErrorCode::NOT_FOUND)?;

        let members: Vec<&StoredObject> = match table.kind {
            TableKind::Contents | TableKind::Hierarchy => {
                let want_folders = table.kind == TableKind::Hierarchy;
                self.objects
                    .values()
                    .filter(|object| {
                        !object.parent.is_empty()
                            && is_same_object(&object.parent, &host.entry_id)
                            && (object.object_type == ObjectType::Folder) == want_folders
                    })
                    .collect()
            }
            TableKind::Attachments => host
                .children
                .iter()
                .filter(|child| child.object_type == ObjectType::Attachment)
                .collect(),
            TableKind::Recipients => host
                .children
                .iter()
                .filter(|child| child.object_type == ObjectType::MailUser)
                .collect(),
            TableKind::AssociatedContents => Vec::new(),
        };

        let mut rows: Vec<Vec<Prop>> = members
            .into_iter()
            .map(StoredObject::row)
            .filter(|row| {
                table
                    .restriction
                    .as_ref()
                    .map_or(true, |restriction| matches(restriction, row, &self.locale))
            })
            .collect();
        rows.sort_by(|a, b| sort_rows(a, b, &table.sort, &self.locale));
        Ok(rows)
    }

    fn fetch(&mut self, table_id: TableId, rows: RowRequest) -> Result<RowSet, ErrorCode> {
        let all = self.table_rows(table_id)?;
        let table = self.table_mut(table_id)?;
        let start = table.position.min(all.len());
        let end = start.saturating_add(rows.count as usize).min(all.len());
        table.position = end;
        trace!(start, end, flags = table.flags, "fetching rows");
        let columns = table.columns.clone();

        let rows = all[start..end]
            .iter()
            .map(|row| project(row, columns.as_deref()))
            .collect::<Result<_, _>>()?;
        Ok(RowSet { rows })
    }

    fn query_rows(&mut self, request: &QueryRowsRequest) -> Reply {
        Ok(RpcResponse::Rows(self.fetch(request.table_id, request.rows)?))
    }

    fn seek_row(&mut self, request: &SeekRowRequest) -> Reply {
        let len = self.table_rows(request.table_id)?.len() as i64;
        let table = self.table_mut(request.table_id)?;
        let base = match request.origin {
            SeekOrigin::Beginning => 0,
            SeekOrigin::Current => table.position as i64,
            SeekOrigin::End => len,
        };
        let target = (base + i64::from(request.offset)).clamp(0, len);
        table.position = target as usize;
        Ok(RpcResponse::Seek(SeekRowResponse {
            rows_sought: (target - base) as i32,
        }))
    }

    fn table_multi(&mut self, request: TableMultiRequest) -> Reply {
        let table_id = match (request.table_id, &request.open) {
            (Some(table_id), _) if self.tables.contains_key(&table_id.as_u32()) => table_id,
            (None, Some(open)) => self.open_table(open)?,
            _ => return Err(ErrorCode::NOT_FOUND),
        };
        trace!(table = table_id.as_u32(), ops = ?request.operations(), "batched table call");

        let restriction = match &request.restriction {
            Some(RestrictionUpdate::Set(wire)) => Some(Some(
                restriction_from_wire(wire).map_err(|_| ErrorCode::INVALID_PARAMETER)?,
            )),
            Some(RestrictionUpdate::Clear) => Some(None),
            None => None,
        };
        let table = self.table_mut(table_id)?;
        if let Some(flags) = request.flags {
            table.flags = flags;
        }
        if let Some(columns) = request.columns {
            table.columns = Some(columns.into_iter().map(PropTag).collect());
        }
        if let Some(restriction) = restriction {
            table.restriction = restriction;
            table.position = 0;
        }
        if let Some(sort) = request.sort {
            table.sort = sort;
            table.position = 0;
        }
        let rows = match request.rows {
            Some(rows) => Some(self.fetch(table_id, rows)?),
            None => None,
        };
        Ok(RpcResponse::TableMulti(TableMultiResponse { table_id, rows }))
    }
}

fn check_instances(
    delta: &ObjectDelta,
    instances: &HashMap<Vec<u8>, Vec<u8>>,
) -> Result<(), ErrorCode> {
    if let Some(instance) = &delta.instance {
        if delta.instance_body.is_none() && !instances.contains_key(&instance.instance_id) {
            return Err(ErrorCode::UNKNOWN_INSTANCE);
        }
    }
    delta
        .children
        .iter()
        .try_for_each(|child| check_instances(child, instances))
}

fn apply_delta(
    object: &mut StoredObject,
    delta: &ObjectDelta,
    next_server_id: &mut u32,
    instances: &mut HashMap<Vec<u8>, Vec<u8>>,
) {
    for tag in &delta.deleted_tags {
        object.props.remove(&tag.id());
    }
    for prop in delta.modified.iter().filter(|prop| prop.as_error().is_none()) {
        object.props.insert(prop.tag.id(), prop.clone());
    }
    if let Some(instance) = &delta.instance {
        let body = delta
            .instance_body
            .clone()
            .or_else(|| instances.get(&instance.instance_id).cloned());
        if let Some(body) = body {
            instances.insert(instance.instance_id.clone(), body.clone());
            object
                .props
                .insert(instance.tag.id(), Prop::new(instance.tag, PropertyValue::Binary(body)));
        }
        object.instance = Some(WireInstance::from_ref(instance, None));
    }

    for child_delta in &delta.children {
        let local_id = child_delta.local_id.as_u32();
        let position = object.children.iter().position(|child| {
            child.object_type == child_delta.object_type && child.local_id == local_id
        });
        if child_delta.deleted {
            if let Some(index) = position {
                object.children.remove(index);
            }
            continue;
        }
        let index = match position {
            Some(index) => index,
            None => {
                let server_id = *next_server_id;
                *next_server_id += 1;
                object
                    .children
                    .push(StoredObject::new(child_delta.object_type, local_id, server_id));
                object.children.len() - 1
            }
        };
        apply_delta(&mut object.children[index], child_delta, next_server_id, instances);
    }
}

fn find_prop(row: &[Prop], tag: PropTag) -> Option<&Prop> {
    row.iter().find(|prop| prop.tag.id() == tag.id())
}

fn relop_holds(relop: RelOp, ordering: Ordering) -> bool {
    match relop {
        RelOp::Lt => ordering == Ordering::Less,
        RelOp::Le => ordering != Ordering::Greater,
        RelOp::Gt => ordering == Ordering::Greater,
        RelOp::Ge => ordering != Ordering::Less,
        RelOp::Eq | RelOp::Re => ordering == Ordering::Equal,
        RelOp::Ne => ordering != Ordering::Equal,
    }
}

/// Evaluates a restriction against one row.
///
/// Sub-object restrictions always match; the server keeps no sub-object rows
/// in table rows.
fn matches(restriction: &Restriction, row: &[Prop], locale: &Locale) -> bool {
    match restriction {
        Restriction::And(children) => children.iter().all(|r| matches(r, row, locale)),
        Restriction::Or(children) => children.iter().any(|r| matches(r, row, locale)),
        Restriction::Not(child) => !matches(child, row, locale),
        Restriction::Content { tag, value, .. } => {
            find_prop(row, *tag).is_some_and(|prop| match (prop.value.as_str(), value.value.as_str()) {
                (Some(text), Some(needle)) => text.to_lowercase().contains(&needle.to_lowercase()),
                _ => prop.value == value.value,
            })
        }
        Restriction::Property { relop, tag, value } => find_prop(row, *tag)
            .is_some_and(|prop| relop_holds(*relop, prop.compare(value, locale))),
        Restriction::CompareProps { relop, left, right } => {
            match (find_prop(row, *left), find_prop(row, *right)) {
                (Some(a), Some(b)) => relop_holds(*relop, a.compare(b, locale)),
                _ => false,
            }
        }
        Restriction::BitMask { op, tag, mask } => find_prop(row, *tag)
            .and_then(|prop| prop.value.as_long())
            .is_some_and(|value| {
                let hit = (value as u32) & mask != 0;
                match op {
                    BitMaskOp::EqualZero => !hit,
                    BitMaskOp::NotEqualZero => hit,
                }
            }),
        Restriction::Size { relop, tag, size } => find_prop(row, *tag)
            .is_some_and(|prop| relop_holds(*relop, prop.value.size().cmp(&(*size as usize)))),
        Restriction::Exist { tag } => find_prop(row, *tag).is_some(),
        Restriction::SubRestriction { .. } => true,
        Restriction::Comment { restriction, .. } => restriction
            .as_ref()
            .map_or(true, |inner| matches(inner, row, locale)),
    }
}

fn sort_rows(a: &[Prop], b: &[Prop], keys: &[SortKey], locale: &Locale) -> Ordering {
    for key in keys {
        let tag = PropTag(key.tag);
        let ordering = match (find_prop(a, tag), find_prop(b, tag)) {
            (Some(x), Some(y)) => x.compare(y, locale),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = match key.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn project(
    row: &[Prop],
    columns: Option<&[PropTag]>,
) -> Result<Vec<mapisync_codec::WireProp>, ErrorCode> {
    let props: Vec<Prop> = match columns {
        Some(columns) => columns
            .iter()
            .map(|column| {
                find_prop(row, *column)
                    .cloned()
                    .unwrap_or_else(|| Prop::error(*column, ErrorCode::NOT_FOUND))
            })
            .collect(),
        None => row.to_vec(),
    };
    props
        .iter()
        .map(|prop| marshal(prop).map_err(|_| ErrorCode::CALL_FAILED))
        .collect()
}

/// An in-memory server answering request frames.
pub struct MemoryServer {
    state: Mutex<ServerState>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    /// Creates a server holding only an empty root folder.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState::new()),
        }
    }

    /// Returns the store GUID used in issued entry ids.
    pub fn store_guid(&self) -> Uuid {
        self.state.lock().store_guid
    }

    /// Returns the entry id of the root folder.
    pub fn root(&self) -> Vec<u8> {
        self.state.lock().root.clone()
    }

    /// Creates a folder under `parent` and returns its entry id.
    pub fn add_folder(&self, parent: &[u8], name: &str) -> Vec<u8> {
        self.state.lock().insert(
            ObjectType::Folder,
            parent.to_vec(),
            vec![Prop::new(
                tags::PR_DISPLAY_NAME,
                PropertyValue::Unicode(name.to_owned()),
            )],
        )
    }

    /// Creates a message in `folder` and returns its entry id.
    pub fn add_message(&self, folder: &[u8], props: Vec<Prop>) -> Vec<u8> {
        self.state
            .lock()
            .insert(ObjectType::Message, folder.to_vec(), props)
    }

    /// Returns a copy of a stored top-level object.
    pub fn object(&self, entry_id: &[u8]) -> Option<StoredObject> {
        let state = self.state.lock();
        let server_id = state.locate(entry_id)?;
        state.objects.get(&server_id).cloned()
    }

    /// Reads one stored property of a top-level object.
    pub fn prop(&self, entry_id: &[u8], tag: PropTag) -> Option<PropertyValue> {
        self.object(entry_id)
            .and_then(|object| object.prop(tag).cloned())
    }

    /// Drops every session and every open table.
    pub fn expire_sessions(&self) {
        let mut state = self.state.lock();
        debug!(sessions = state.sessions.len(), "expiring sessions");
        state.sessions.clear();
        state.tables.clear();
    }

    /// Makes the next call named `call` fail with `code`.
    pub fn fail_next(&self, call: &'static str, code: ErrorCode) {
        self.state.lock().faults.push((call, code));
    }

    /// Returns true if the server holds a single-instance payload.
    pub fn knows_instance(&self, instance_id: &[u8]) -> bool {
        self.state.lock().instances.contains_key(instance_id)
    }

    /// Returns the names of every call received, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// Forgets the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Returns the number of open tables.
    pub fn open_tables(&self) -> usize {
        self.state.lock().tables.len()
    }

    /// Answers one decoded request.
    pub fn handle(&self, frame: RequestFrame) -> ResponseFrame {
        match self.state.lock().dispatch(frame) {
            Ok(response) => ResponseFrame::ok(response),
            Err(code) => ResponseFrame::error(code),
        }
    }
}

impl LoopbackServer for MemoryServer {
    fn handle_frame(&self, frame: &[u8]) -> Result<Vec<u8>, String> {
        let request = RequestFrame::decode(frame).map_err(|e| e.to_string())?;
        self.handle(request).encode().map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapisync_protocol::LogonRequest;

    fn logon(server: &MemoryServer) -> u64 {
        let frame = RequestFrame {
            session: 0,
            request: RpcRequest::Logon(LogonRequest {
                user: "tester".into(),
                client_version: "test".into(),
            }),
        };
        server
            .handle(frame)
            .into_result()
            .unwrap()
            .into_logon()
            .unwrap()
            .session
    }

    fn subject(text: &str) -> Prop {
        Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode(text.into()))
    }

    #[test]
    fn calls_need_a_live_session() {
        let server = MemoryServer::new();
        let request = RpcRequest::LoadObject(LoadObjectRequest::new(server.root(), 1024));
        let stale = server.handle(RequestFrame {
            session: 99,
            request: request.clone(),
        });
        assert_eq!(stale.into_result(), Err(ErrorCode::END_OF_SESSION));

        let session = logon(&server);
        let answer = server.handle(RequestFrame { session, request });
        assert!(answer.into_result().is_ok());

        server.expire_sessions();
        assert_eq!(server.calls(), vec!["load_object", "logon", "load_object"]);
    }

    #[test]
    fn large_values_are_only_announced() {
        let server = MemoryServer::new();
        let body = "x".repeat(100);
        let id = server.add_message(
            &server.root(),
            vec![
                subject("small"),
                Prop::new(tags::PR_BODY, PropertyValue::Unicode(body)),
            ],
        );
        let session = logon(&server);
        let snapshot = server
            .handle(RequestFrame {
                session,
                request: RpcRequest::LoadObject(LoadObjectRequest::new(id, 32)),
            })
            .into_result()
            .unwrap()
            .into_object()
            .unwrap();
        assert_eq!(snapshot.tags_available, vec![tags::PR_BODY.as_u32()]);
        assert_eq!(snapshot.props.len(), 1);
    }

    #[test]
    fn injected_fault_fires_once() {
        let server = MemoryServer::new();
        let session = logon(&server);
        server.fail_next("table_open", ErrorCode::NO_ACCESS);
        let open = TableOpenRequest {
            server_id: 1,
            kind: TableKind::Contents.code(),
            flags: 0,
        };
        let first = server.handle(RequestFrame {
            session,
            request: RpcRequest::TableOpen(open.clone()),
        });
        assert_eq!(first.into_result(), Err(ErrorCode::NO_ACCESS));
        let second = server.handle(RequestFrame {
            session,
            request: RpcRequest::TableOpen(open),
        });
        assert!(second.into_result().is_ok());
        assert_eq!(server.open_tables(), 1);
    }

    #[test]
    fn restriction_and_sort_shape_rows() {
        let server = MemoryServer::new();
        let root = server.root();
        for text in ["beta", "alpha", "gamma"] {
            server.add_message(&root, vec![subject(text)]);
        }
        let mut state = server.state.lock();
        let table_id = state
            .open_table(&TableOpenRequest {
                server_id: 1,
                kind: TableKind::Contents.code(),
                flags: 0,
            })
            .unwrap();
        {
            let table = state.table_mut(table_id).unwrap();
            table.sort = vec![SortKey::ascending(tags::PR_SUBJECT.as_u32())];
            table.restriction = Some(Restriction::Not(Box::new(Restriction::Property {
                relop: RelOp::Eq,
                tag: tags::PR_SUBJECT,
                value: subject("GAMMA"),
            })));
        }
        let rows = state.table_rows(table_id).unwrap();
        let subjects: Vec<_> = rows
            .iter()
            .map(|row| find_prop(row, tags::PR_SUBJECT).unwrap().value.clone())
            .collect();
        assert_eq!(
            subjects,
            vec![
                PropertyValue::Unicode("alpha".into()),
                PropertyValue::Unicode("beta".into()),
            ]
        );
    }

    #[test]
    fn seek_clamps_to_table() {
        let server = MemoryServer::new();
        let root = server.root();
        server.add_message(&root, vec![subject("one")]);
        server.add_message(&root, vec![subject("two")]);
        let mut state = server.state.lock();
        let table_id = state
            .open_table(&TableOpenRequest {
                server_id: 1,
                kind: TableKind::Contents.code(),
                flags: 0,
            })
            .unwrap();
        let seek = |state: &mut ServerState, origin, offset| {
            state
                .seek_row(&SeekRowRequest {
                    table_id,
                    origin,
                    offset,
                })
                .unwrap()
                .into_seek()
                .unwrap()
                .rows_sought
        };
        assert_eq!(seek(&mut *state, SeekOrigin::Beginning, 5), 2);
        assert_eq!(seek(&mut *state, SeekOrigin::Current, -1), -1);
        assert_eq!(seek(&mut *state, SeekOrigin::End, -10), -2);
    }

    #[test]
    fn unknown_instance_without_body() {
        let server = MemoryServer::new();
        let instances = HashMap::new();
        let mut delta = ObjectDelta {
            object_type: ObjectType::Attachment,
            local_id: mapisync_core::LocalId(1),
            server_id: mapisync_core::ServerId(0),
            entry_id: Vec::new(),
            deleted: false,
            deleted_tags: Vec::new(),
            modified: Vec::new(),
            children: Vec::new(),
            instance: Some(mapisync_core::SingleInstanceRef::from_content(
                tags::PR_ATTACH_DATA_BIN,
                b"payload",
            )),
            instance_body: None,
        };
        assert_eq!(
            check_instances(&delta, &instances),
            Err(ErrorCode::UNKNOWN_INSTANCE)
        );
        delta.instance_body = Some(b"payload".to_vec());
        assert_eq!(check_instances(&delta, &instances), Ok(()));
        assert!(server.calls().is_empty());
    }
}
