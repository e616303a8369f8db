//! # MapiSync Core
//!
//! Client-side state of remote property objects.
//!
//! This crate provides:
//! - `PropertyCache` with available, loaded-clean and loaded-dirty entries
//! - `ObjectState` trees with cascading deletion
//! - Differential save payloads and server snapshot merging
//! - Per-tag handlers for computed properties
//! - Capability traits instead of interface probing
//! - The local named-property table
//!
//! Nothing here performs I/O. The sync engine drives these types against
//! an RPC transport.
//!
//! ## Usage
//!
//! ```
//! use mapisync_codec::{tags, Prop, PropertyValue};
//! use mapisync_core::{DeltaOptions, ObjectState};
//! use mapisync_entryid::ObjectType;
//!
//! let mut message = ObjectState::new(ObjectType::Message);
//! message
//!     .set_prop(&Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode("Hi".into())))
//!     .unwrap();
//! let delta = message.build_delta(&DeltaOptions::default());
//! assert_eq!(delta.modified.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod capability;
mod delta;
mod entry;
mod error;
mod handler;
mod named;
mod object;
mod types;

pub use cache::PropertyCache;
pub use capability::{PropReadable, PropWritable, SingleInstance, TableHost, TableKind};
pub use delta::{DeltaOptions, ObjectDelta, ObjectSnapshot};
pub use entry::{EntryState, PropertyEntry};
pub use error::{CoreError, CoreResult};
pub use handler::{ComputedGetter, ComputedSetter, HandlerTable, PropertyHandler};
pub use named::{
    local_id_for, local_name_for, NameKind, PropertyName, PSETID_ADDRESS, PSETID_APPOINTMENT,
    PSETID_COMMON, PSETID_LOG, PSETID_MEETING, PSETID_TASK, PS_MAPI, PS_PUBLIC_STRINGS,
    SERVER_NAMED_BASE,
};
pub use object::ObjectState;
pub use types::{ChildKey, LocalId, ServerId, SingleInstanceRef};
