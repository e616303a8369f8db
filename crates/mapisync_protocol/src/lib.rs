//! # MapiSync Protocol
//!
//! RPC message types and CBOR framing for mapisync.
//!
//! This crate provides:
//! - Object messages (load, save, demand load) and their conversion to and
//!   from core snapshots and deltas
//! - Table messages, including the batched `TableMultiRequest`
//! - Named-property resolution messages
//! - `RequestFrame` / `ResponseFrame` envelopes
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod names;
mod object;
mod rpc;
mod table;

pub use error::{ProtocolError, ProtocolResult};
pub use names::{
    GetIdsFromNamesRequest, GetIdsFromNamesResponse, GetNamesFromIdsRequest,
    GetNamesFromIdsResponse, WireName, WireNameKind,
};
pub use object::{
    LoadObjectRequest, LoadPropRequest, LoadPropResponse, SaveObjectRequest, WireDelta,
    WireInstance, WireSnapshot,
};
pub use rpc::{LogonRequest, LogonResponse, RequestFrame, ResponseFrame, RpcRequest, RpcResponse};
pub use table::{
    QueryRowsRequest, RestrictionUpdate, RowCountResponse, RowRequest, RowSet, SeekOrigin,
    SeekRowRequest, SeekRowResponse, SetColumnsRequest, SetRestrictionRequest, SortKey,
    SortOrder, SortRequest, TableId, TableMultiRequest, TableMultiResponse, TableOpenRequest,
    TableOpenResponse,
};
