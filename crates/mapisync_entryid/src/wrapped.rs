//! Wrapped store entry ids.
//!
//! A store reached through a redirect provider is addressed by wrapping its
//! own id:
//!
//! ```text
//! flags[4] WRAPPED_STORE_GUID[16] version u8 flag u8 dll_name\0 pad-to-4 nested...
//! ```
//!
//! The nested bytes run to the end of the buffer. Unlike the DLL name they
//! carry no NUL terminator: the wrapper length alone delimits them, and any
//! trailing zero bytes belong to the nested id.

use crate::error::{EntryIdError, EntryIdResult};
use crate::reader::{pad4, ByteReader};
use crate::types::WRAPPED_STORE_GUID;
use crate::view::EntryIdView;

/// Smallest possible wrapped id: header plus an empty DLL name terminator.
pub const WRAPPED_MIN_LEN: usize = 23;

/// A decoded wrapped store id borrowing from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrappedEntryId<'a> {
    flags: [u8; 4],
    version: u8,
    flag: u8,
    dll_name: &'a [u8],
    nested: &'a [u8],
}

impl<'a> WrappedEntryId<'a> {
    /// Creates a wrapper around `nested` naming the provider `dll_name`.
    pub fn new(dll_name: &'a [u8], nested: &'a [u8]) -> Self {
        Self {
            flags: [0; 4],
            version: 0,
            flag: 0,
            dll_name,
            nested,
        }
    }

    /// Decodes a wrapped id.
    pub fn decode(bytes: &'a [u8]) -> EntryIdResult<Self> {
        let mut reader = ByteReader::new(bytes, "wrapped store", WRAPPED_MIN_LEN)?;
        let flags = reader.read_array::<4>()?;
        let guid = reader.read_guid()?;
        if guid != WRAPPED_STORE_GUID {
            return Err(EntryIdError::invalid("not a wrapped store entry id"));
        }
        let version = reader.read_u8()?;
        let flag = reader.read_u8()?;
        let dll_name = reader.read_cstr()?;
        reader.align4()?;
        Ok(Self {
            flags,
            version,
            flag,
            dll_name,
            nested: reader.rest(),
        })
    }

    /// Encodes the wrapper.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(WRAPPED_MIN_LEN + self.dll_name.len() + 3 + self.nested.len());
        buf.extend_from_slice(&self.flags);
        buf.extend_from_slice(WRAPPED_STORE_GUID.as_bytes());
        buf.push(self.version);
        buf.push(self.flag);
        buf.extend_from_slice(self.dll_name);
        buf.push(0);
        pad4(&mut buf);
        buf.extend_from_slice(self.nested);
        buf
    }

    /// Returns the leading flags.
    pub fn flags(&self) -> [u8; 4] {
        self.flags
    }

    /// Returns the wrapper version byte.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the wrapper flag byte.
    pub fn flag(&self) -> u8 {
        self.flag
    }

    /// Returns the provider DLL name (without terminator).
    pub fn dll_name(&self) -> &'a [u8] {
        self.dll_name
    }

    /// Returns the wrapped entry id bytes.
    pub fn nested(&self) -> &'a [u8] {
        self.nested
    }

    /// Decodes the wrapped entry id.
    pub fn nested_view(&self) -> EntryIdResult<EntryIdView<'a>> {
        crate::view::decode(self.nested)
    }
}

/// Wraps `inner` so it can be opened through the provider `dll_name`.
pub fn wrap(inner: &[u8], dll_name: &str) -> EntryIdResult<Vec<u8>> {
    if dll_name.as_bytes().contains(&0) {
        return Err(EntryIdError::invalid("provider name contains NUL"));
    }
    Ok(WrappedEntryId::new(dll_name.as_bytes(), inner).encode())
}

/// Returns the entry id wrapped inside `bytes`.
pub fn unwrap(bytes: &[u8]) -> EntryIdResult<&[u8]> {
    WrappedEntryId::decode(bytes).map(|wrapped| wrapped.nested())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreEntryId;
    use crate::types::ObjectType;
    use uuid::Uuid;

    #[test]
    fn wrap_unwrap_is_identity() {
        let inner = StoreEntryId::v1(Uuid::from_bytes([1; 16]), ObjectType::Store, Uuid::nil())
            .with_server_path(b"pseudo://alice")
            .encode();
        let wrapped = wrap(&inner, "dll").unwrap();
        assert_eq!(unwrap(&wrapped).unwrap(), &inner[..]);
    }

    #[test]
    fn inner_bytes_may_start_with_zero_flags() {
        let inner = [0u8, 0, 0, 0, 0xFF];
        for name in ["", "a", "ab", "abc", "abcd", "zarafa6.dll"] {
            let wrapped = wrap(&inner, name).unwrap();
            assert_eq!(unwrap(&wrapped).unwrap(), &inner[..], "dll name {name:?}");
        }
    }

    #[test]
    fn nested_is_aligned() {
        let wrapped = wrap(b"\x01", "dll").unwrap();
        // 22 header bytes + "dll\0" = 26, padded to 28.
        assert_eq!(wrapped.len(), 29);
        assert_eq!(wrapped[28], 1);
    }

    #[test]
    fn nested_bytes_carry_no_terminator() {
        let inner = StoreEntryId::v0(Uuid::from_bytes([2; 16]), ObjectType::Store, 9).encode();
        let wrapped = wrap(&inner, "abc").unwrap();
        assert_eq!(wrapped.len(), 28 + inner.len());
        assert!(wrapped.ends_with(&inner));

        let with_zeros = [7u8, 0, 0];
        let wrapped = wrap(&with_zeros, "abc").unwrap();
        assert_eq!(unwrap(&wrapped).unwrap(), &with_zeros[..]);
    }

    #[test]
    fn nested_view_decodes_recursively() {
        let inner = StoreEntryId::v0(Uuid::from_bytes([2; 16]), ObjectType::Store, 9).encode();
        let wrapped = wrap(&inner, "dll").unwrap();
        let decoded = WrappedEntryId::decode(&wrapped).unwrap();
        assert_eq!(decoded.dll_name(), b"dll");
        match decoded.nested_view().unwrap() {
            EntryIdView::Store(store) => assert_eq!(store.local_id(), Some(9)),
            other => panic!("unexpected view {other:?}"),
        }
    }

    #[test]
    fn unwrap_rejects_other_shapes() {
        let plain = StoreEntryId::v0(Uuid::from_bytes([2; 16]), ObjectType::Store, 9).encode();
        assert!(matches!(
            unwrap(&plain),
            Err(EntryIdError::InvalidEntryId { .. })
        ));
        assert!(matches!(
            unwrap(&[0u8; 5]),
            Err(EntryIdError::Truncated { .. })
        ));
    }

    #[test]
    fn unterminated_dll_name_is_an_error() {
        let mut bytes = vec![0u8; 4];
        bytes.extend_from_slice(WRAPPED_STORE_GUID.as_bytes());
        bytes.extend_from_slice(&[0, 0, b'd', b'l', b'l']);
        assert!(matches!(
            WrappedEntryId::decode(&bytes),
            Err(EntryIdError::InvalidEntryId { .. })
        ));
    }
}
