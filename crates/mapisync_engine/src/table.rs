//! Table operation batcher.
//!
//! Column, restriction, sort, flag and row operations on a server table
//! either run at once or wait in a pending batch. A batch goes out as one
//! `TableMulti` call; the server applies its fields in a fixed order
//! (flags, columns, restriction, sort, rows).
//!
//! The server-side handle is created by the first call that needs it. When
//! the session is lost the table is reopened and the last column set and
//! sort order are replayed. Restriction and cursor position are not.

use crate::config::TableConfig;
use crate::error::{EngineError, EngineResult};
use crate::session::Session;
use crate::transport::RpcTransport;
use mapisync_codec::{restriction_to_wire, unmarshal_all, PropRow, PropTag, Restriction};
use mapisync_core::ServerId;
use mapisync_protocol::{
    QueryRowsRequest, RestrictionUpdate, RowCountResponse, RowRequest, RowSet, RpcRequest,
    RpcResponse, SeekOrigin, SeekRowRequest, SetColumnsRequest, SetRestrictionRequest, SortKey,
    SortRequest, TableId, TableMultiRequest, TableOpenRequest,
};
use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Whether operations are waiting to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Nothing pending.
    Idle,
    /// At least one batched operation is waiting.
    Pending,
}

/// A set of table operations, at most one of each kind.
#[derive(Debug, Clone, Default, PartialEq)]
struct TableOps {
    flags: Option<u32>,
    columns: Option<Vec<u32>>,
    restriction: Option<RestrictionUpdate>,
    sort: Option<Vec<SortKey>>,
    rows: Option<RowRequest>,
}

impl TableOps {
    fn len(&self) -> usize {
        usize::from(self.flags.is_some())
            + usize::from(self.columns.is_some())
            + usize::from(self.restriction.is_some())
            + usize::from(self.sort.is_some())
            + usize::from(self.rows.is_some())
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `other` carries an operation kind already present here.
    fn overlaps(&self, other: &TableOps) -> bool {
        (self.flags.is_some() && other.flags.is_some())
            || (self.columns.is_some() && other.columns.is_some())
            || (self.restriction.is_some() && other.restriction.is_some())
            || (self.sort.is_some() && other.sort.is_some())
            || (self.rows.is_some() && other.rows.is_some())
    }

    /// Adds `other`; its operations replace those of the same kind.
    fn absorb(&mut self, other: TableOps) {
        if other.flags.is_some() {
            self.flags = other.flags;
        }
        if other.columns.is_some() {
            self.columns = other.columns;
        }
        if other.restriction.is_some() {
            self.restriction = other.restriction;
        }
        if other.sort.is_some() {
            self.sort = other.sort;
        }
        if other.rows.is_some() {
            self.rows = other.rows;
        }
    }

    fn apply_to(&self, request: &mut TableMultiRequest) {
        if self.flags.is_some() {
            request.flags = self.flags;
        }
        if self.columns.is_some() {
            request.columns = self.columns.clone();
        }
        if self.restriction.is_some() {
            request.restriction = self.restriction.clone();
        }
        if self.sort.is_some() {
            request.sort = self.sort.clone();
        }
        if self.rows.is_some() {
            request.rows = self.rows;
        }
    }

    /// The dedicated request for a lone operation, if it has one.
    fn single_request(&self, table_id: TableId) -> Option<RpcRequest> {
        if self.len() != 1 {
            return None;
        }
        if let Some(columns) = &self.columns {
            return Some(RpcRequest::TableSetColumns(SetColumnsRequest {
                table_id,
                columns: columns.clone(),
            }));
        }
        if let Some(update) = &self.restriction {
            let restriction = match update {
                RestrictionUpdate::Clear => None,
                RestrictionUpdate::Set(wire) => Some(wire.clone()),
            };
            return Some(RpcRequest::TableSetRestriction(SetRestrictionRequest {
                table_id,
                restriction,
            }));
        }
        if let Some(keys) = &self.sort {
            return Some(RpcRequest::TableSort(SortRequest {
                table_id,
                keys: keys.clone(),
            }));
        }
        self.rows
            .map(|rows| RpcRequest::TableQueryRows(QueryRowsRequest { table_id, rows }))
    }
}

#[derive(Debug, Default)]
struct TableState {
    table_id: Option<TableId>,
    generation: u64,
    opened_before: bool,
    pending: TableOps,
    columns: Option<Vec<u32>>,
    sort: Option<Vec<SortKey>>,
}

/// Batches operations on one server table.
pub struct TableOpBatcher<T: RpcTransport> {
    session: Arc<Session<T>>,
    open: TableOpenRequest,
    state: Mutex<TableState>,
}

fn rows_of(set: RowSet) -> Vec<PropRow> {
    set.rows.iter().map(|row| unmarshal_all(row)).collect()
}

impl<T: RpcTransport> TableOpBatcher<T> {
    /// Creates a batcher for a table of the object `server_id`.
    pub fn new(session: Arc<Session<T>>, server_id: ServerId, config: TableConfig) -> Self {
        Self {
            session,
            open: TableOpenRequest {
                server_id: server_id.as_u32(),
                kind: config.kind.code(),
                flags: config.open_flags,
            },
            state: Mutex::new(TableState::default()),
        }
    }

    /// Returns whether operations are pending.
    pub fn state(&self) -> BatchState {
        if self.state.lock().pending.is_empty() {
            BatchState::Idle
        } else {
            BatchState::Pending
        }
    }

    /// Returns the server handle, if the table is open in the current session.
    pub fn table_id(&self) -> Option<TableId> {
        let state = self.state.lock();
        self.fresh_id(&state)
    }

    fn fresh_id(&self, state: &TableState) -> Option<TableId> {
        state
            .table_id
            .filter(|_| state.generation == self.session.generation())
    }

    /// Sets the column set.
    pub fn set_columns(&self, columns: &[PropTag], batch: bool) -> EngineResult<()> {
        let ops = TableOps {
            columns: Some(columns.iter().map(|tag| tag.as_u32()).collect()),
            ..TableOps::default()
        };
        self.submit(ops, batch).map(drop)
    }

    /// Sets the restriction, or clears it with `None`.
    pub fn restrict(&self, restriction: Option<&Restriction>, batch: bool) -> EngineResult<()> {
        let update = match restriction {
            Some(restriction) => RestrictionUpdate::Set(restriction_to_wire(restriction)?),
            None => RestrictionUpdate::Clear,
        };
        let ops = TableOps {
            restriction: Some(update),
            ..TableOps::default()
        };
        self.submit(ops, batch).map(drop)
    }

    /// Sets the sort order.
    pub fn sort(&self, keys: &[SortKey], batch: bool) -> EngineResult<()> {
        let ops = TableOps {
            sort: Some(keys.to_vec()),
            ..TableOps::default()
        };
        self.submit(ops, batch).map(drop)
    }

    /// Changes table-scoped flags.
    pub fn set_flags(&self, flags: u32, batch: bool) -> EngineResult<()> {
        let ops = TableOps {
            flags: Some(flags),
            ..TableOps::default()
        };
        self.submit(ops, batch).map(drop)
    }

    fn row_request(&self, count: u32, flags: u32) -> TableOps {
        let count = if count == 0 {
            self.session.config().default_row_count
        } else {
            count
        };
        TableOps {
            rows: Some(RowRequest { count, flags }),
            ..TableOps::default()
        }
    }

    /// Fetches up to `count` rows now, sending any pending operations with
    /// the request. A zero count uses the configured default.
    pub fn query_rows(&self, count: u32, flags: u32) -> EngineResult<Vec<PropRow>> {
        let rows = self.submit(self.row_request(count, flags), false)?;
        Ok(rows.unwrap_or_default())
    }

    /// Queues a row request; the rows come back from [`flush`](Self::flush).
    pub fn defer_query_rows(&self, count: u32, flags: u32) -> EngineResult<()> {
        self.submit(self.row_request(count, flags), true).map(drop)
    }

    /// Sends the pending operations, if any.
    ///
    /// Pending state is cleared whether or not the call succeeds.
    pub fn flush(&self) -> EngineResult<Option<Vec<PropRow>>> {
        let mut state = self.state.lock();
        let pending = mem::take(&mut state.pending);
        if pending.is_empty() {
            return Ok(None);
        }
        self.dispatch(&mut state, pending)
    }

    fn submit(&self, ops: TableOps, batch: bool) -> EngineResult<Option<Vec<PropRow>>> {
        let mut state = self.state.lock();
        if batch {
            state.pending.absorb(ops);
            trace!(pending = state.pending.len(), "table operation queued");
            return Ok(None);
        }

        let mut pending = mem::take(&mut state.pending);
        if pending.overlaps(&ops) {
            self.dispatch(&mut state, pending)?;
            return self.dispatch(&mut state, ops);
        }
        pending.absorb(ops);
        self.dispatch(&mut state, pending)
    }

    /// Sends `ops`, reopening the table once if the session was lost.
    fn dispatch(
        &self,
        state: &mut TableState,
        ops: TableOps,
    ) -> EngineResult<Option<Vec<PropRow>>> {
        match self.send(state, &ops) {
            Err(err) if err.is_session_lost() && self.session.config().retry_on_session_expiry => {
                warn!(error = %err, "session lost during table call, reopening");
                self.session.reconnect()?;
                self.session.record(|s| s.session_retries += 1);
                state.table_id = None;
                self.send(state, &ops)
            }
            other => other,
        }
    }

    fn send(&self, state: &mut TableState, ops: &TableOps) -> EngineResult<Option<Vec<PropRow>>> {
        let fresh = self.fresh_id(state);
        if let Some(request) = fresh.and_then(|id| ops.single_request(id)) {
            let response = self.session.call_once(&request)?;
            self.remember(state, ops);
            return match response {
                RpcResponse::Rows(set) => Ok(Some(rows_of(set))),
                _ => Ok(None),
            };
        }

        let mut request = match fresh {
            Some(id) => TableMultiRequest::for_table(id),
            None => {
                let mut request = TableMultiRequest::opening(self.open.clone());
                if state.opened_before {
                    debug!(
                        columns = state.columns.is_some(),
                        sort = state.sort.is_some(),
                        "reopening table, replaying columns and sort"
                    );
                    request.columns = state.columns.clone();
                    request.sort = state.sort.clone();
                    self.session.record(|s| s.table_replays += 1);
                }
                request
            }
        };
        ops.apply_to(&mut request);
        trace!(operations = ?request.operations(), "sending table batch");

        let response = self
            .session
            .call_once(&RpcRequest::TableMulti(request))?
            .into_table_multi()?;
        state.table_id = Some(response.table_id);
        state.generation = self.session.generation();
        state.opened_before = true;
        self.remember(state, ops);
        self.session.record(|s| s.table_flushes += 1);
        Ok(response.rows.map(rows_of))
    }

    fn remember(&self, state: &mut TableState, ops: &TableOps) {
        if ops.columns.is_some() {
            state.columns = ops.columns.clone();
        }
        if ops.sort.is_some() {
            state.sort = ops.sort.clone();
        }
    }

    /// Runs a non-batched call that needs an open table, after flushing.
    fn call_on_table(
        &self,
        build: impl Fn(TableId) -> RpcRequest,
    ) -> EngineResult<RpcResponse> {
        let mut state = self.state.lock();
        let pending = mem::take(&mut state.pending);
        if !pending.is_empty() {
            self.dispatch(&mut state, pending)?;
        }
        match self.call_open(&mut state, &build) {
            Err(err) if err.is_session_lost() && self.session.config().retry_on_session_expiry => {
                warn!(error = %err, "session lost during table call, reopening");
                self.session.reconnect()?;
                self.session.record(|s| s.session_retries += 1);
                state.table_id = None;
                self.call_open(&mut state, &build)
            }
            other => other,
        }
    }

    fn call_open(
        &self,
        state: &mut TableState,
        build: &impl Fn(TableId) -> RpcRequest,
    ) -> EngineResult<RpcResponse> {
        if self.fresh_id(state).is_none() {
            self.send(state, &TableOps::default())?;
        }
        let table_id = state
            .table_id
            .ok_or_else(|| EngineError::invalid_state("table did not open"))?;
        self.session.call_once(&build(table_id))
    }

    /// Returns the row count and cursor position.
    pub fn get_row_count(&self) -> EngineResult<RowCountResponse> {
        Ok(self
            .call_on_table(RpcRequest::TableGetRowCount)?
            .into_row_count()?)
    }

    /// Moves the cursor and returns the number of rows moved.
    pub fn seek_row(&self, origin: SeekOrigin, offset: i32) -> EngineResult<i32> {
        let response = self.call_on_table(|table_id| {
            RpcRequest::TableSeekRow(SeekRowRequest {
                table_id,
                origin,
                offset,
            })
        })?;
        Ok(response.into_seek()?.rows_sought)
    }

    /// Releases the server handle and drops pending operations.
    pub fn close(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.pending = TableOps::default();
        let Some(table_id) = self.fresh_id(&state) else {
            state.table_id = None;
            return Ok(());
        };
        state.table_id = None;
        self.session.call_once(&RpcRequest::TableClose(table_id))?;
        Ok(())
    }
}
