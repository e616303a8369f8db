//! # MapiSync Entry IDs
//!
//! Binary codec for the opaque object identifiers ("entry ids") handed out
//! by the groupware server.
//!
//! Supported shapes:
//! - Store ids, version 0 (numeric local id) and version 1 (object GUID)
//! - Address-book ids, version 0 and version 1 (external id string)
//! - Wrapped store ids, which nest another entry id behind a provider name
//!
//! Entry ids are persisted by clients, so every layout here is frozen:
//! integers are little-endian and trailing strings are NUL-terminated and
//! padded to a four-byte boundary.
//!
//! ## Usage
//!
//! ```
//! use mapisync_entryid::{decode, EntryIdView, ObjectType, StoreEntryId};
//! use uuid::Uuid;
//!
//! let id = StoreEntryId::v0(Uuid::nil(), ObjectType::Folder, 42).encode();
//! match decode(&id).unwrap() {
//!     EntryIdView::Store(store) => assert_eq!(store.local_id(), Some(42)),
//!     _ => unreachable!(),
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod abook;
mod error;
mod reader;
mod store;
mod types;
mod view;
mod wrapped;

pub use abook::{matches_fixed_prefix, AbEntryId, AB_FIXED_LEN};
pub use error::{EntryIdError, EntryIdResult};
pub use store::{
    with_server_path, StoreEntryId, StoreKey, STORE_V0_FIXED_LEN, STORE_V1_FIXED_LEN,
    VERSION_OFFSET,
};
pub use types::{ObjectType, AB_PROVIDER_GUID, WRAPPED_STORE_GUID};
pub use view::{decode, is_same_object, peek_version, EntryIdView, Shape};
pub use wrapped::{unwrap, wrap, WrappedEntryId, WRAPPED_MIN_LEN};
