//! Bounds-checked little-endian reader and trailing-string helpers.

use crate::error::{EntryIdError, EntryIdResult};
use uuid::Uuid;

/// Cursor over an entry id that never reads past the end of its input.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    shape: &'static str,
    needed: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader for `shape`, rejecting input shorter than `needed` up front.
    pub(crate) fn new(data: &'a [u8], shape: &'static str, needed: usize) -> EntryIdResult<Self> {
        if data.len() < needed {
            return Err(EntryIdError::truncated(shape, needed, data.len()));
        }
        Ok(Self {
            data,
            pos: 0,
            shape,
            needed,
        })
    }

    fn take(&mut self, len: usize) -> EntryIdResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| EntryIdError::truncated(self.shape, self.needed, self.data.len()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> EntryIdResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> EntryIdResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> EntryIdResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_u32(&mut self) -> EntryIdResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_guid(&mut self) -> EntryIdResult<Uuid> {
        Ok(Uuid::from_bytes(self.read_array()?))
    }

    /// Reads a NUL-terminated string; the terminator is consumed but not returned.
    pub(crate) fn read_cstr(&mut self) -> EntryIdResult<&'a [u8]> {
        let rest = &self.data[self.pos..];
        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| EntryIdError::invalid(format!("unterminated string in {}", self.shape)))?;
        self.pos += nul + 1;
        Ok(&rest[..nul])
    }

    /// Skips zero padding up to the next 4-byte boundary of the whole buffer.
    pub(crate) fn align4(&mut self) -> EntryIdResult<()> {
        let pad = (4 - self.pos % 4) % 4;
        let pad = pad.min(self.data.len() - self.pos);
        self.take(pad).map(|_| ())
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }
}

/// Parses the optional trailing string of a fixed-form entry id.
///
/// Anything after the first NUL is padding. A missing terminator is
/// tolerated: the whole tail is the string.
pub(crate) fn trailing_string(tail: &[u8]) -> &[u8] {
    match tail.iter().position(|b| *b == 0) {
        Some(nul) => &tail[..nul],
        None => tail,
    }
}

/// Appends `value`, its NUL terminator and zero padding to a 4-byte boundary.
pub(crate) fn push_trailing_string(buf: &mut Vec<u8>, value: &[u8]) {
    buf.extend_from_slice(value);
    buf.push(0);
    pad4(buf);
}

pub(crate) fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Length of the dynamic form for a trailing string of `len` bytes.
pub(crate) const fn dynamic_len(fixed: usize, len: usize) -> usize {
    (fixed + len + 1 + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_rejects_short_input_up_front() {
        let err = ByteReader::new(&[0u8; 3], "test", 4).err().unwrap();
        assert_eq!(err, EntryIdError::truncated("test", 4, 3));
    }

    #[test]
    fn reader_reads_little_endian() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let mut reader = ByteReader::new(&bytes, "test", 6).unwrap();
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
        assert_eq!(reader.read_u32().unwrap(), 0x0605_0403);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn trailing_string_stops_at_nul() {
        assert_eq!(trailing_string(b"srv\0\0\0\0\0"), b"srv");
        assert_eq!(trailing_string(b"no-nul"), b"no-nul");
        assert_eq!(trailing_string(b""), b"");
    }

    #[test]
    fn trailing_string_is_padded() {
        let mut buf = vec![0u8; 32];
        push_trailing_string(&mut buf, b"");
        assert_eq!(buf.len(), 36);

        let mut buf = vec![0u8; 32];
        push_trailing_string(&mut buf, b"abc");
        assert_eq!(buf.len(), 36);

        let mut buf = vec![0u8; 32];
        push_trailing_string(&mut buf, b"abcd");
        assert_eq!(buf.len(), 40);
        assert_eq!(dynamic_len(32, 4), 40);
        assert_eq!(dynamic_len(32, 0), 36);
    }

    #[test]
    fn align_skips_to_boundary() {
        let bytes = [1u8, 2, 3, 0, 9];
        let mut reader = ByteReader::new(&bytes, "test", 1).unwrap();
        reader.read_u8().unwrap();
        reader.align4().unwrap();
        assert_eq!(reader.rest(), &[9]);
    }
}
