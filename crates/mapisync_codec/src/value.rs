//! Typed property values.

use crate::code::ErrorCode;
use crate::error::{CodecError, CodecResult};
use crate::restriction::{Action, Restriction};
use crate::tag::{PropTag, PropType};
use crate::text::{narrow_into, narrow_to_wide, wide_to_narrow};
use serde::{Deserialize, Serialize};
use std::mem::size_of;
use uuid::Uuid;

/// A 64-bit quantity split into high and low words, as currency and file
/// times travel on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct HiLo {
    /// High 32 bits (signed).
    pub hi: i32,
    /// Low 32 bits.
    pub lo: u32,
}

impl HiLo {
    /// Splits a 64-bit value.
    pub const fn from_i64(value: i64) -> Self {
        Self {
            hi: (value >> 32) as i32,
            lo: value as u32,
        }
    }

    /// Joins the two words.
    pub const fn as_i64(self) -> i64 {
        ((self.hi as i64) << 32) | self.lo as i64
    }
}

/// A property value.
///
/// Text is stored wide. `String8` and `MvString8` only exist as caller input
/// or as requested output; `copy_from` and `into_stored` transcode them.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// No value.
    Null,
    /// 16-bit integer.
    I2(i16),
    /// 32-bit integer.
    Long(i32),
    /// 32-bit float.
    R4(f32),
    /// 64-bit float.
    Double(f64),
    /// Currency.
    Currency(HiLo),
    /// Application time.
    AppTime(f64),
    /// Error code in place of a value.
    Error(ErrorCode),
    /// Boolean.
    Boolean(bool),
    /// 64-bit integer.
    I8(i64),
    /// Narrow text (boundary only).
    String8(Vec<u8>),
    /// Wide text.
    Unicode(String),
    /// File time.
    SysTime(HiLo),
    /// GUID.
    Clsid(Uuid),
    /// Opaque bytes.
    Binary(Vec<u8>),
    /// Multi-valued 16-bit integers.
    MvI2(Vec<i16>),
    /// Multi-valued 32-bit integers.
    MvLong(Vec<i32>),
    /// Multi-valued 32-bit floats.
    MvR4(Vec<f32>),
    /// Multi-valued 64-bit floats.
    MvDouble(Vec<f64>),
    /// Multi-valued currency.
    MvCurrency(Vec<HiLo>),
    /// Multi-valued application time.
    MvAppTime(Vec<f64>),
    /// Multi-valued 64-bit integers.
    MvI8(Vec<i64>),
    /// Multi-valued narrow text (boundary only).
    MvString8(Vec<Vec<u8>>),
    /// Multi-valued wide text.
    MvUnicode(Vec<String>),
    /// Multi-valued file times.
    MvSysTime(Vec<HiLo>),
    /// Multi-valued GUIDs.
    MvClsid(Vec<Uuid>),
    /// Multi-valued binary.
    MvBinary(Vec<Vec<u8>>),
    /// Restriction tree.
    Restriction(Box<Restriction>),
    /// Rule actions.
    Actions(Vec<Action>),
}

impl PropertyValue {
    /// Returns the concrete type of this value.
    pub fn prop_type(&self) -> PropType {
        match self {
            Self::Null => PropType::NULL,
            Self::I2(_) => PropType::I2,
            Self::Long(_) => PropType::LONG,
            Self::R4(_) => PropType::R4,
            Self::Double(_) => PropType::DOUBLE,
            Self::Currency(_) => PropType::CURRENCY,
            Self::AppTime(_) => PropType::APPTIME,
            Self::Error(_) => PropType::ERROR,
            Self::Boolean(_) => PropType::BOOLEAN,
            Self::I8(_) => PropType::I8,
            Self::String8(_) => PropType::STRING8,
            Self::Unicode(_) => PropType::UNICODE,
            Self::SysTime(_) => PropType::SYSTIME,
            Self::Clsid(_) => PropType::CLSID,
            Self::Binary(_) => PropType::BINARY,
            Self::MvI2(_) => PropType::MV_I2,
            Self::MvLong(_) => PropType::MV_LONG,
            Self::MvR4(_) => PropType::MV_R4,
            Self::MvDouble(_) => PropType::MV_DOUBLE,
            Self::MvCurrency(_) => PropType::MV_CURRENCY,
            Self::MvAppTime(_) => PropType::MV_APPTIME,
            Self::MvI8(_) => PropType::MV_I8,
            Self::MvString8(_) => PropType::MV_STRING8,
            Self::MvUnicode(_) => PropType::MV_UNICODE,
            Self::MvSysTime(_) => PropType::MV_SYSTIME,
            Self::MvClsid(_) => PropType::MV_CLSID,
            Self::MvBinary(_) => PropType::MV_BINARY,
            Self::Restriction(_) => PropType::SRESTRICTION,
            Self::Actions(_) => PropType::ACTIONS,
        }
    }

    /// Logical size in bytes. Capacity is tracked separately by the owner.
    pub fn size(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::I2(_) => size_of::<i16>(),
            Self::Long(_) | Self::R4(_) | Self::Error(_) => size_of::<u32>(),
            Self::Boolean(_) => size_of::<u16>(),
            Self::Double(_) | Self::AppTime(_) | Self::I8(_) => size_of::<u64>(),
            Self::Currency(_) | Self::SysTime(_) => size_of::<HiLo>(),
            Self::Clsid(_) => 16,
            Self::String8(bytes) | Self::Binary(bytes) => bytes.len(),
            Self::Unicode(text) => text.len(),
            Self::MvI2(v) => v.len() * size_of::<i16>(),
            Self::MvLong(v) => v.len() * size_of::<i32>(),
            Self::MvR4(v) => v.len() * size_of::<f32>(),
            Self::MvDouble(v) | Self::MvAppTime(v) => v.len() * size_of::<f64>(),
            Self::MvI8(v) => v.len() * size_of::<i64>(),
            Self::MvCurrency(v) | Self::MvSysTime(v) => v.len() * size_of::<HiLo>(),
            Self::MvClsid(v) => v.len() * 16,
            Self::MvString8(v) | Self::MvBinary(v) => v.iter().map(Vec::len).sum(),
            Self::MvUnicode(v) => v.iter().map(String::len).sum(),
            Self::Restriction(r) => r.size(),
            Self::Actions(actions) => actions.iter().map(Action::size).sum(),
        }
    }

    /// Converts narrow text to wide; every other value is returned unchanged.
    pub fn into_stored(self) -> Self {
        match self {
            Self::String8(bytes) => Self::Unicode(narrow_to_wide(&bytes)),
            Self::MvString8(values) => {
                Self::MvUnicode(values.iter().map(|b| narrow_to_wide(b)).collect())
            }
            other => other,
        }
    }

    /// Deep-copies `other` into `self`, reusing the existing allocation when
    /// the stored kind matches.
    ///
    /// Narrow text is transcoded to wide. Buffers never shrink; only their
    /// logical length changes.
    pub fn copy_from(&mut self, other: &PropertyValue) -> CodecResult<()> {
        match (&mut *self, other) {
            (Self::Binary(dst), Self::Binary(src)) => copy_slice(dst, src),
            (Self::Unicode(dst), Self::Unicode(src)) => copy_text(dst, src),
            (Self::Unicode(dst), Self::String8(src)) => {
                reserve_text(dst, src.len())?;
                narrow_into(src, dst);
                Ok(())
            }
            (Self::MvBinary(dst), Self::MvBinary(src)) => copy_each(dst, src, |d, s| copy_slice(d, s)),
            (Self::MvUnicode(dst), Self::MvUnicode(src)) => copy_each(dst, src, |d, s| copy_text(d, s)),
            (Self::MvUnicode(dst), Self::MvString8(src)) => copy_each(dst, src, |d, s| {
                reserve_text(d, s.len())?;
                narrow_into(s, d);
                Ok(())
            }),
            (Self::MvI2(dst), Self::MvI2(src)) => copy_slice(dst, src),
            (Self::MvLong(dst), Self::MvLong(src)) => copy_slice(dst, src),
            (Self::MvR4(dst), Self::MvR4(src)) => copy_slice(dst, src),
            (Self::MvDouble(dst), Self::MvDouble(src))
            | (Self::MvAppTime(dst), Self::MvAppTime(src)) => copy_slice(dst, src),
            (Self::MvI8(dst), Self::MvI8(src)) => copy_slice(dst, src),
            (Self::MvCurrency(dst), Self::MvCurrency(src))
            | (Self::MvSysTime(dst), Self::MvSysTime(src)) => copy_slice(dst, src),
            (Self::MvClsid(dst), Self::MvClsid(src)) => copy_slice(dst, src),
            (dst, src) => {
                *dst = src.clone().into_stored();
                Ok(())
            }
        }
    }

    /// Returns a copy shaped for a request of type `requested`.
    ///
    /// Wide text is returned narrow when the request asks for `STRING8`;
    /// everything else is a plain deep copy.
    pub fn coerce_to(&self, requested: PropType) -> Self {
        match (self, requested) {
            (Self::Unicode(text), PropType::STRING8) => Self::String8(wide_to_narrow(text)),
            (Self::MvUnicode(values), PropType::MV_STRING8) => {
                Self::MvString8(values.iter().map(|v| wide_to_narrow(v)).collect())
            }
            (value, _) => value.clone(),
        }
    }

    /// Returns the error code if this value stands in for an absent value.
    pub fn as_error(&self) -> Option<ErrorCode> {
        match self {
            Self::Error(code) => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this value is an error stand-in.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns the value as a 32-bit integer.
    pub fn as_long(&self) -> Option<i32> {
        match self {
            Self::Long(v) => Some(*v),
            Self::I2(v) => Some(i32::from(*v)),
            _ => None,
        }
    }

    /// Returns the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns binary contents.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(v) => Some(v),
            _ => None,
        }
    }

    /// Returns wide text contents.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Unicode(v) => Some(v),
            _ => None,
        }
    }
}

fn alloc_err(requested: usize) -> CodecError {
    CodecError::not_enough_memory(requested)
}

fn copy_slice<T: Copy>(dst: &mut Vec<T>, src: &[T]) -> CodecResult<()> {
    dst.clear();
    dst.try_reserve(src.len()).map_err(|_| alloc_err(src.len()))?;
    dst.extend_from_slice(src);
    Ok(())
}

fn reserve_text(dst: &mut String, len: usize) -> CodecResult<()> {
    dst.clear();
    dst.try_reserve(len).map_err(|_| alloc_err(len))
}

fn copy_text(dst: &mut String, src: &str) -> CodecResult<()> {
    reserve_text(dst, src.len())?;
    dst.push_str(src);
    Ok(())
}

/// Copies element-wise, reusing existing elements' buffers.
fn copy_each<T: Default, U>(
    dst: &mut Vec<T>,
    src: &[U],
    copy: impl Fn(&mut T, &U) -> CodecResult<()>,
) -> CodecResult<()> {
    dst.truncate(src.len());
    let missing = src.len() - dst.len();
    dst.try_reserve(missing).map_err(|_| alloc_err(missing))?;
    for (idx, item) in src.iter().enumerate() {
        if idx == dst.len() {
            dst.push(T::default());
        }
        copy(&mut dst[idx], item)?;
    }
    Ok(())
}

fn f32_eq(a: f32, b: f32) -> bool {
    a.to_bits() == b.to_bits()
}

fn f64_eq(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits()
}

/// Floats compare bit-exactly, so `NaN == NaN` when the payloads match.
impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::I2(a), Self::I2(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::R4(a), Self::R4(b)) => f32_eq(*a, *b),
            (Self::Double(a), Self::Double(b)) | (Self::AppTime(a), Self::AppTime(b)) => {
                f64_eq(*a, *b)
            }
            (Self::Currency(a), Self::Currency(b)) | (Self::SysTime(a), Self::SysTime(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::I8(a), Self::I8(b)) => a == b,
            (Self::String8(a), Self::String8(b)) | (Self::Binary(a), Self::Binary(b)) => a == b,
            (Self::Unicode(a), Self::Unicode(b)) => a == b,
            (Self::Clsid(a), Self::Clsid(b)) => a == b,
            (Self::MvI2(a), Self::MvI2(b)) => a == b,
            (Self::MvLong(a), Self::MvLong(b)) => a == b,
            (Self::MvR4(a), Self::MvR4(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| f32_eq(*x, *y))
            }
            (Self::MvDouble(a), Self::MvDouble(b)) | (Self::MvAppTime(a), Self::MvAppTime(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| f64_eq(*x, *y))
            }
            (Self::MvCurrency(a), Self::MvCurrency(b))
            | (Self::MvSysTime(a), Self::MvSysTime(b)) => a == b,
            (Self::MvI8(a), Self::MvI8(b)) => a == b,
            (Self::MvString8(a), Self::MvString8(b)) | (Self::MvBinary(a), Self::MvBinary(b)) => {
                a == b
            }
            (Self::MvUnicode(a), Self::MvUnicode(b)) => a == b,
            (Self::MvClsid(a), Self::MvClsid(b)) => a == b,
            (Self::Restriction(a), Self::Restriction(b)) => a == b,
            (Self::Actions(a), Self::Actions(b)) => a == b,
            _ => false,
        }
    }
}

/// A tagged property value.
#[derive(Debug, Clone, PartialEq)]
pub struct Prop {
    /// Tag; its type should match the value's.
    pub tag: PropTag,
    /// Value.
    pub value: PropertyValue,
}

impl Prop {
    /// Creates a property.
    pub fn new(tag: PropTag, value: PropertyValue) -> Self {
        Self { tag, value }
    }

    /// Creates an error slot for `tag`: the tag's type becomes `ERROR`.
    pub fn error(tag: PropTag, code: ErrorCode) -> Self {
        Self {
            tag: tag.with_type(PropType::ERROR),
            value: PropertyValue::Error(code),
        }
    }

    /// Returns the error code if this slot carries an error.
    pub fn as_error(&self) -> Option<ErrorCode> {
        self.value.as_error()
    }
}
