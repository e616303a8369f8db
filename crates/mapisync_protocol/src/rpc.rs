//! Request and response envelopes.

use crate::error::{ProtocolError, ProtocolResult};
use crate::names::{
    GetIdsFromNamesRequest, GetIdsFromNamesResponse, GetNamesFromIdsRequest,
    GetNamesFromIdsResponse,
};
use crate::object::{LoadObjectRequest, LoadPropRequest, LoadPropResponse, SaveObjectRequest, WireSnapshot};
use crate::table::{
    QueryRowsRequest, RowCountResponse, RowSet, SeekRowRequest, SeekRowResponse,
    SetColumnsRequest, SetRestrictionRequest, SortRequest, TableId, TableMultiRequest,
    TableMultiResponse, TableOpenRequest, TableOpenResponse,
};
use mapisync_codec::{cbor_frame, ErrorCode};
use serde::{Deserialize, Serialize};

/// Starts a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogonRequest {
    /// Account name.
    pub user: String,
    /// Client version string.
    pub client_version: String,
}

/// Answer to a logon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogonResponse {
    /// Session handle for subsequent calls.
    pub session: u64,
}

/// Every call the client can make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcRequest {
    /// Start a session.
    Logon(LogonRequest),
    /// Load a whole object.
    LoadObject(LoadObjectRequest),
    /// Save an object.
    SaveObject(SaveObjectRequest),
    /// Load one large property.
    LoadProp(LoadPropRequest),
    /// Resolve names to ids.
    GetIdsFromNames(GetIdsFromNamesRequest),
    /// Resolve ids to names.
    GetNamesFromIds(GetNamesFromIdsRequest),
    /// Open a table.
    TableOpen(TableOpenRequest),
    /// Set the column set.
    TableSetColumns(SetColumnsRequest),
    /// Set or clear the restriction.
    TableSetRestriction(SetRestrictionRequest),
    /// Set the sort order.
    TableSort(SortRequest),
    /// Fetch rows.
    TableQueryRows(QueryRowsRequest),
    /// Move the cursor.
    TableSeekRow(SeekRowRequest),
    /// Count rows.
    TableGetRowCount(TableId),
    /// Batched table operations.
    TableMulti(TableMultiRequest),
    /// Release a table.
    TableClose(TableId),
}

impl RpcRequest {
    /// Returns the call name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Logon(_) => "logon",
            Self::LoadObject(_) => "load_object",
            Self::SaveObject(_) => "save_object",
            Self::LoadProp(_) => "load_prop",
            Self::GetIdsFromNames(_) => "get_ids_from_names",
            Self::GetNamesFromIds(_) => "get_names_from_ids",
            Self::TableOpen(_) => "table_open",
            Self::TableSetColumns(_) => "table_set_columns",
            Self::TableSetRestriction(_) => "table_set_restriction",
            Self::TableSort(_) => "table_sort",
            Self::TableQueryRows(_) => "table_query_rows",
            Self::TableSeekRow(_) => "table_seek_row",
            Self::TableGetRowCount(_) => "table_get_row_count",
            Self::TableMulti(_) => "table_multi",
            Self::TableClose(_) => "table_close",
        }
    }
}

/// Every successful answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcResponse {
    /// Session started.
    Logon(LogonResponse),
    /// Object contents, for load and save.
    Object(WireSnapshot),
    /// Demand-loaded property.
    Prop(LoadPropResponse),
    /// Resolved ids.
    Ids(GetIdsFromNamesResponse),
    /// Resolved names.
    Names(GetNamesFromIdsResponse),
    /// Table opened.
    TableOpened(TableOpenResponse),
    /// Rows.
    Rows(RowSet),
    /// Cursor moved.
    Seek(SeekRowResponse),
    /// Row count.
    RowCount(RowCountResponse),
    /// Batched table answer.
    TableMulti(TableMultiResponse),
    /// Call succeeded with nothing to return.
    Done,
}

impl RpcResponse {
    /// Returns the response kind, for errors and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Logon(_) => "logon",
            Self::Object(_) => "object",
            Self::Prop(_) => "prop",
            Self::Ids(_) => "ids",
            Self::Names(_) => "names",
            Self::TableOpened(_) => "table_opened",
            Self::Rows(_) => "rows",
            Self::Seek(_) => "seek",
            Self::RowCount(_) => "row_count",
            Self::TableMulti(_) => "table_multi",
            Self::Done => "done",
        }
    }
}

macro_rules! expect_response {
    ($($fn_name:ident => $variant:ident($ty:ty)),+ $(,)?) => {
        impl RpcResponse {
            $(
                #[doc = concat!("Unwraps a `", stringify!($variant), "` response.")]
                pub fn $fn_name(self) -> ProtocolResult<$ty> {
                    match self {
                        Self::$variant(inner) => Ok(inner),
                        other => Err(ProtocolError::UnexpectedResponse {
                            expected: stringify!($variant),
                            actual: other.kind(),
                        }),
                    }
                }
            )+
        }
    };
}

expect_response! {
    into_logon => Logon(LogonResponse),
    into_object => Object(WireSnapshot),
    into_prop => Prop(LoadPropResponse),
    into_ids => Ids(GetIdsFromNamesResponse),
    into_names => Names(GetNamesFromIdsResponse),
    into_table_opened => TableOpened(TableOpenResponse),
    into_rows => Rows(RowSet),
    into_seek => Seek(SeekRowResponse),
    into_row_count => RowCount(RowCountResponse),
    into_table_multi => TableMulti(TableMultiResponse),
}

/// A request as framed on the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Session handle; zero before logon.
    pub session: u64,
    /// The call.
    pub request: RpcRequest,
}

/// A response as framed on the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Call status.
    pub code: ErrorCode,
    /// Answer, present when `code` is not a failure.
    pub response: Option<RpcResponse>,
}

impl ResponseFrame {
    /// A successful answer.
    pub fn ok(response: RpcResponse) -> Self {
        Self {
            code: ErrorCode::SUCCESS,
            response: Some(response),
        }
    }

    /// A failed call.
    pub fn error(code: ErrorCode) -> Self {
        Self {
            code,
            response: None,
        }
    }

    /// Splits into the answer or the failure code.
    pub fn into_result(self) -> Result<RpcResponse, ErrorCode> {
        match self.response {
            Some(response) if !self.code.is_failure() => Ok(response),
            _ if self.code.is_failure() => Err(self.code),
            _ => Err(ErrorCode::CALL_FAILED),
        }
    }
}

cbor_frame!(RequestFrame, ResponseFrame);
