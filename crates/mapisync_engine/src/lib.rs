//! # MapiSync Engine
//!
//! Synchronises client-side object state with a groupware server.
//!
//! This crate provides:
//! - `RpcTransport` with a mock, a CBOR-framed channel transport and an
//!   in-process loopback channel
//! - `Session`: logon, one-shot re-authentication and named-property memo
//! - `ObjectSyncEngine`: open, reload, demand load, multi-property reads and
//!   writes, differential save with the single-instance retry
//! - `TableOpBatcher`: batched table operations with lazy open and replay
//!   after reconnect
//!
//! ## Architecture
//!
//! Calls are synchronous and block the calling thread. Each engine guards its
//! object with one re-entrant lock held for the whole of every operation; the
//! RPC call is the only blocking step inside it.
//!
//! ## Key Invariants
//!
//! - A lost session is re-established at most once per call
//! - A save either merges completely or leaves the object untouched
//! - The single-instance retry happens at most once per save
//! - A flush clears pending table operations whatever its outcome
//! - After a reconnect, only columns and sort order are replayed

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod framed;
mod names;
mod session;
mod sync;
mod table;
mod transport;

pub use config::{EngineConfig, TableConfig};
pub use error::{EngineError, EngineResult};
pub use framed::{FramedTransport, LoopbackChannel, LoopbackServer, RpcChannel};
pub use names::NamedPropResolver;
pub use session::{EngineStats, Session};
pub use sync::{
    BatchStatus, Capabilities, ObjectSyncEngine, OpenMode, PropBatch, PropProblem, SaveOutcome,
};
pub use table::{BatchState, TableOpBatcher};
pub use transport::{MockTransport, RpcTransport};
