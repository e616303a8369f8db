//! # MapiSync Codec
//!
//! Typed property values and their wire representation.
//!
//! This crate provides:
//! - Property tags and type codes
//! - `PropertyValue` with deep copy, bit-exact equality and size accounting
//! - Restriction trees and rule actions
//! - Locale-aware comparison
//! - The RPC value union with per-slot error substitution on unmarshal
//! - CBOR framing helpers
//!
//! Text is always stored wide. Narrow (Windows-1252) text is accepted from
//! callers and produced on request, never kept.
//!
//! ## Usage
//!
//! ```
//! use mapisync_codec::{marshal, tags, unmarshal, Prop, PropertyValue};
//!
//! let prop = Prop::new(tags::PR_SUBJECT, PropertyValue::Unicode("Hello".into()));
//! let wire = marshal(&prop).unwrap();
//! assert_eq!(unmarshal(&wire), prop);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod code;
mod compare;
mod error;
mod frame;
mod restriction;
mod tag;
mod text;
mod value;
mod wire;

pub use code::ErrorCode;
pub use compare::Locale;
pub use error::{CodecError, CodecResult};
pub use frame::{from_cbor, to_cbor, Decode, Encode};
pub use restriction::{Action, ActionKind, BitMaskOp, FuzzyLevel, PropRow, RelOp, Restriction};
pub use tag::{tags, PropTag, PropType};
pub use text::{narrow_to_wide, wide_to_narrow};
pub use value::{HiLo, Prop, PropertyValue};
pub use wire::{
    marshal, marshal_all, restriction_from_wire, restriction_to_wire, unmarshal, unmarshal_all,
    WireAction, WireActionBody, WireProp, WireRestriction, WireValue,
};
