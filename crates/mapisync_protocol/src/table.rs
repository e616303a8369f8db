//! Table messages.
//!
//! Single operations each have their own request. [`TableMultiRequest`]
//! carries any subset of them in one call; the server applies the present
//! fields in a fixed order: flags, columns, restriction, sort, rows.

use mapisync_codec::{WireProp, WireRestriction};
use serde::{Deserialize, Serialize};

/// Server-side table handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl TableId {
    /// Creates a table id.
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

/// Sort direction of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending.
    Ascending,
    /// Descending.
    Descending,
}

/// One sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Sort column.
    pub tag: u32,
    /// Direction.
    pub order: SortOrder,
}

impl SortKey {
    /// Ascending key on `tag`.
    pub fn ascending(tag: u32) -> Self {
        Self {
            tag,
            order: SortOrder::Ascending,
        }
    }

    /// Descending key on `tag`.
    pub fn descending(tag: u32) -> Self {
        Self {
            tag,
            order: SortOrder::Descending,
        }
    }
}

/// Restriction change carried by a batched request.
///
/// `Clear` removes an existing restriction; a request without any
/// restriction field leaves it untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RestrictionUpdate {
    /// Remove the restriction.
    Clear,
    /// Apply a restriction.
    Set(WireRestriction),
}

/// Row request carried by a batched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRequest {
    /// Maximum rows to return.
    pub count: u32,
    /// Query flags.
    pub flags: u32,
}

/// Cursor origin for seeking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekOrigin {
    /// First row.
    Beginning,
    /// Current row.
    Current,
    /// Past the last row.
    End,
}

/// Opens a table on an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableOpenRequest {
    /// Server id of the hosting object.
    pub server_id: u32,
    /// Table kind code.
    pub kind: u32,
    /// Open flags.
    pub flags: u32,
}

/// Answer to an open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOpenResponse {
    /// New table handle.
    pub table_id: TableId,
}

/// Sets the column set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetColumnsRequest {
    /// Table handle.
    pub table_id: TableId,
    /// Columns.
    pub columns: Vec<u32>,
}

/// Sets or clears the restriction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRestrictionRequest {
    /// Table handle.
    pub table_id: TableId,
    /// Restriction, or `None` to clear.
    pub restriction: Option<WireRestriction>,
}

/// Sets the sort order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRequest {
    /// Table handle.
    pub table_id: TableId,
    /// Sort keys, most significant first.
    pub keys: Vec<SortKey>,
}

/// Fetches rows at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRowsRequest {
    /// Table handle.
    pub table_id: TableId,
    /// Rows and flags.
    pub rows: RowRequest,
}

/// Moves the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekRowRequest {
    /// Table handle.
    pub table_id: TableId,
    /// Origin.
    pub origin: SeekOrigin,
    /// Signed row offset.
    pub offset: i32,
}

/// Answer to a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekRowResponse {
    /// Rows actually moved.
    pub rows_sought: i32,
}

/// Row count and cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCountResponse {
    /// Total rows.
    pub count: u32,
    /// Cursor position.
    pub position: u32,
}

/// Rows returned by a query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowSet {
    /// Rows, each in column order.
    pub rows: Vec<Vec<WireProp>>,
}

/// Any subset of table operations in one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMultiRequest {
    /// Existing handle; `None` asks the server to open the table first.
    pub table_id: Option<TableId>,
    /// Open parameters, used when `table_id` is `None`.
    pub open: Option<TableOpenRequest>,
    /// Table flag changes.
    pub flags: Option<u32>,
    /// Column set.
    pub columns: Option<Vec<u32>>,
    /// Restriction change.
    pub restriction: Option<RestrictionUpdate>,
    /// Sort keys.
    pub sort: Option<Vec<SortKey>>,
    /// Row request.
    pub rows: Option<RowRequest>,
}

impl TableMultiRequest {
    /// Creates an empty request for an open table.
    pub fn for_table(table_id: TableId) -> Self {
        Self {
            table_id: Some(table_id),
            open: None,
            flags: None,
            columns: None,
            restriction: None,
            sort: None,
            rows: None,
        }
    }

    /// Creates an empty request that opens the table first.
    pub fn opening(open: TableOpenRequest) -> Self {
        Self {
            table_id: None,
            open: Some(open),
            ..Self::for_table(TableId(0))
        }
    }

    /// Names of the operations present, in application order.
    pub fn operations(&self) -> Vec<&'static str> {
        let mut ops = Vec::new();
        if self.open.is_some() && self.table_id.is_none() {
            ops.push("open");
        }
        if self.flags.is_some() {
            ops.push("flags");
        }
        if self.columns.is_some() {
            ops.push("columns");
        }
        if self.restriction.is_some() {
            ops.push("restriction");
        }
        if self.sort.is_some() {
            ops.push("sort");
        }
        if self.rows.is_some() {
            ops.push("rows");
        }
        ops
    }
}

/// Answer to a batched request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMultiResponse {
    /// Handle of the table the batch ran on.
    pub table_id: TableId,
    /// Rows, present if rows were requested.
    pub rows: Option<RowSet>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_follow_fixed_order() {
        let mut req = TableMultiRequest::for_table(TableId(3));
        req.rows = Some(RowRequest { count: 10, flags: 0 });
        req.restriction = Some(RestrictionUpdate::Clear);
        req.columns = Some(vec![0x0037_001F]);
        assert_eq!(req.operations(), vec!["columns", "restriction", "rows"]);
    }

    #[test]
    fn opening_request_has_no_handle() {
        let req = TableMultiRequest::opening(TableOpenRequest {
            server_id: 4,
            kind: 1,
            flags: 0,
        });
        assert_eq!(req.table_id, None);
        assert_eq!(req.operations(), vec!["open"]);
    }
}
