//! CBOR framing for wire messages.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value as CBOR.
pub fn to_cbor<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buf)
}

/// Decodes a value from CBOR. Trailing bytes are rejected.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let mut reader = bytes;
    let value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CodecError::decoding_failed(format!(
            "{} trailing bytes after frame",
            reader.len()
        )));
    }
    Ok(value)
}

/// Trait for types that can be encoded to a CBOR frame.
pub trait Encode {
    /// Encode this value to CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from a CBOR frame.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

/// Implements [`Encode`] and [`Decode`] through serde for the listed types.
#[macro_export]
macro_rules! cbor_frame {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Encode for $ty {
                fn encode(&self) -> $crate::CodecResult<Vec<u8>> {
                    $crate::to_cbor(self)
                }
            }

            impl $crate::Decode for $ty {
                fn decode(bytes: &[u8]) -> $crate::CodecResult<Self> {
                    $crate::from_cbor(bytes)
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{WireProp, WireValue};

    #[test]
    fn wire_prop_frame_roundtrip() {
        let prop = WireProp {
            tag: 0x0037_001F,
            value: WireValue::Str("subject".into()),
        };
        let bytes = to_cbor(&prop).unwrap();
        let back: WireProp = from_cbor(&bytes).unwrap();
        assert_eq!(back, prop);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = to_cbor(&WireValue::Ul(1)).unwrap();
        bytes.push(0);
        assert!(matches!(
            from_cbor::<WireValue>(&bytes),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(from_cbor::<WireProp>(&[0xFF, 0x00, 0x13]).is_err());
        assert!(from_cbor::<WireProp>(&[]).is_err());
    }
}
