//! Shape detection over raw entry-id bytes.

use crate::abook::AbEntryId;
use crate::error::{EntryIdError, EntryIdResult};
use crate::store::{StoreEntryId, VERSION_OFFSET};
use crate::types::{AB_PROVIDER_GUID, WRAPPED_STORE_GUID};
use crate::wrapped::WrappedEntryId;
use uuid::Uuid;

/// Bytes needed to see the flags and the provider GUID.
const PREFIX_LEN: usize = 20;

/// The recognized entry-id shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Zero-length "no object" sentinel.
    Empty,
    /// Store id, version 0.
    StoreV0,
    /// Store id, version 1.
    StoreV1,
    /// Address-book id.
    AddressBook,
    /// Wrapped store id.
    Wrapped,
}

/// A typed, zero-copy view over entry-id bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryIdView<'a> {
    /// Zero-length entry id.
    Empty,
    /// Store id (either version).
    Store(StoreEntryId<'a>),
    /// Address-book id.
    AddressBook(AbEntryId<'a>),
    /// Wrapped store id.
    Wrapped(WrappedEntryId<'a>),
}

impl<'a> EntryIdView<'a> {
    /// Returns the shape of this view.
    pub fn shape(&self) -> Shape {
        match self {
            Self::Empty => Shape::Empty,
            Self::Store(store) if store.version() == 0 => Shape::StoreV0,
            Self::Store(_) => Shape::StoreV1,
            Self::AddressBook(_) => Shape::AddressBook,
            Self::Wrapped(_) => Shape::Wrapped,
        }
    }

    /// Encodes the view back to bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Empty => Vec::new(),
            Self::Store(store) => store.encode(),
            Self::AddressBook(ab) => ab.encode(),
            Self::Wrapped(wrapped) => wrapped.encode(),
        }
    }

    /// Returns the GUID at offset 4 (store GUID, provider GUID).
    pub fn guid(&self) -> Option<Uuid> {
        match self {
            Self::Empty => None,
            Self::Store(store) => Some(store.store_guid()),
            Self::AddressBook(ab) => Some(ab.guid()),
            Self::Wrapped(_) => Some(WRAPPED_STORE_GUID),
        }
    }

    /// Returns the innermost non-wrapped view.
    pub fn innermost(self) -> EntryIdResult<EntryIdView<'a>> {
        let mut view = self;
        while let Self::Wrapped(wrapped) = view {
            view = wrapped.nested_view()?;
        }
        Ok(view)
    }
}

/// Decodes entry-id bytes, selecting the shape from the provider GUID and
/// the version field.
///
/// Never panics: every malformed input yields an error. A zero-length input
/// is the `Empty` view, not an error.
pub fn decode(bytes: &[u8]) -> EntryIdResult<EntryIdView<'_>> {
    if bytes.is_empty() {
        return Ok(EntryIdView::Empty);
    }
    if bytes.len() < PREFIX_LEN {
        return Err(EntryIdError::truncated("entry id", PREFIX_LEN, bytes.len()));
    }
    let mut guid = [0u8; 16];
    guid.copy_from_slice(&bytes[4..PREFIX_LEN]);
    let guid = Uuid::from_bytes(guid);

    if guid == WRAPPED_STORE_GUID {
        WrappedEntryId::decode(bytes).map(EntryIdView::Wrapped)
    } else if guid == AB_PROVIDER_GUID {
        AbEntryId::decode(bytes).map(EntryIdView::AddressBook)
    } else {
        StoreEntryId::decode(bytes).map(EntryIdView::Store)
    }
}

/// Reads the version field without decoding the rest.
pub fn peek_version(bytes: &[u8]) -> EntryIdResult<u32> {
    let end = VERSION_OFFSET + 4;
    if bytes.len() < end {
        return Err(EntryIdError::truncated("entry id", end, bytes.len()));
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[VERSION_OFFSET..end]);
    Ok(u32::from_le_bytes(raw))
}

/// Returns true if two entry ids name the same object.
///
/// Wrappers are looked through, flags and server paths are ignored. Bytes
/// that do not decode fall back to plain byte equality.
pub fn is_same_object(a: &[u8], b: &[u8]) -> bool {
    let views = decode(a)
        .and_then(EntryIdView::innermost)
        .and_then(|va| decode(b).and_then(EntryIdView::innermost).map(|vb| (va, vb)));
    match views {
        Ok((EntryIdView::Store(x), EntryIdView::Store(y))) => x.same_object(&y),
        Ok((EntryIdView::AddressBook(x), EntryIdView::AddressBook(y))) => x.same_object(&y),
        Ok((EntryIdView::Empty, EntryIdView::Empty)) => true,
        Ok(_) => false,
        Err(_) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectType;
    use crate::wrapped::wrap;

    fn store_guid() -> Uuid {
        Uuid::from_bytes([0x11; 16])
    }

    #[test]
    fn empty_is_a_view() {
        assert_eq!(decode(&[]).unwrap(), EntryIdView::Empty);
        assert_eq!(EntryIdView::Empty.encode(), Vec::<u8>::new());
        assert_eq!(EntryIdView::Empty.shape(), Shape::Empty);
    }

    #[test]
    fn detects_every_shape() {
        let v0 = StoreEntryId::v0(store_guid(), ObjectType::Folder, 1).encode();
        let v1 = StoreEntryId::v1(store_guid(), ObjectType::Folder, Uuid::nil()).encode();
        let ab = AbEntryId::v0(ObjectType::MailUser, 2).encode();
        let wrapped = wrap(&v1, "dll").unwrap();

        assert_eq!(decode(&v0).unwrap().shape(), Shape::StoreV0);
        assert_eq!(decode(&v1).unwrap().shape(), Shape::StoreV1);
        assert_eq!(decode(&ab).unwrap().shape(), Shape::AddressBook);
        assert_eq!(decode(&wrapped).unwrap().shape(), Shape::Wrapped);
    }

    #[test]
    fn encode_inverts_decode() {
        let v1 = StoreEntryId::v1(store_guid(), ObjectType::Message, Uuid::from_bytes([5; 16]))
            .with_server_path(b"pseudo://bob")
            .encode();
        let view = decode(&v1).unwrap();
        assert_eq!(view.encode(), v1);
    }

    #[test]
    fn short_prefix_is_truncated() {
        assert!(matches!(
            decode(&[1, 2, 3]),
            Err(EntryIdError::Truncated { needed: 20, .. })
        ));
    }

    #[test]
    fn peek_version_reads_offset_20() {
        let v1 = StoreEntryId::v1(store_guid(), ObjectType::Folder, Uuid::nil()).encode();
        assert_eq!(peek_version(&v1).unwrap(), 1);
        assert!(peek_version(&v1[..23]).is_err());
    }

    #[test]
    fn same_object_looks_through_wrappers() {
        let plain = StoreEntryId::v0(store_guid(), ObjectType::Store, 1)
            .with_server_path(b"a")
            .encode();
        let other_server = StoreEntryId::v0(store_guid(), ObjectType::Store, 1)
            .with_server_path(b"b")
            .encode();
        let wrapped = wrap(&other_server, "dll").unwrap();
        assert!(is_same_object(&plain, &wrapped));
        assert!(!is_same_object(&plain, &AbEntryId::v0(ObjectType::MailUser, 1).encode()));
    }

    #[test]
    fn undecodable_falls_back_to_bytes() {
        assert!(is_same_object(b"opaque", b"opaque"));
        assert!(!is_same_object(b"opaque", b"opaqu3"));
    }

    #[test]
    fn innermost_unwraps_nested_wrappers() {
        let inner = AbEntryId::v0(ObjectType::MailUser, 4).encode();
        let once = wrap(&inner, "a").unwrap();
        let twice = wrap(&once, "b").unwrap();
        let view = decode(&twice).unwrap().innermost().unwrap();
        assert_eq!(view.shape(), Shape::AddressBook);
    }
}
