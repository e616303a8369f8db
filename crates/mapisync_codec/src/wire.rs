//! The RPC value union and conversion to and from `PropertyValue`.
//!
//! The union discriminant must agree with the type half of the tag. On
//! unmarshal a disagreement does not fail the call: the slot becomes an
//! error value carrying `NOT_FOUND`, so one bad value in a batch leaves the
//! others intact.

use crate::code::ErrorCode;
use crate::error::{CodecError, CodecResult};
use crate::restriction::{Action, ActionKind, BitMaskOp, FuzzyLevel, PropRow, RelOp, Restriction};
use crate::tag::{PropTag, PropType};
use crate::text::narrow_to_wide;
use crate::value::{HiLo, Prop, PropertyValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire form of a property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    /// No value.
    Null,
    /// 16-bit integer.
    I(i16),
    /// 32-bit integer (sent unsigned).
    Ul(u32),
    /// 32-bit float.
    Flt(f32),
    /// 64-bit float (double and application time).
    Dbl(f64),
    /// Boolean.
    B(bool),
    /// Text, always UTF-8 on the wire.
    Str(String),
    /// Bytes (binary and GUIDs).
    Bin(Vec<u8>),
    /// 64-bit integer.
    Li(i64),
    /// Split 64-bit value (currency and file time).
    HiLo(HiLo),
    /// Multi-valued 16-bit integers.
    MvI(Vec<i16>),
    /// Multi-valued 32-bit integers.
    MvL(Vec<u32>),
    /// Multi-valued 32-bit floats.
    MvFlt(Vec<f32>),
    /// Multi-valued 64-bit floats.
    MvDbl(Vec<f64>),
    /// Multi-valued text.
    MvStr(Vec<String>),
    /// Multi-valued bytes.
    MvBin(Vec<Vec<u8>>),
    /// Multi-valued 64-bit integers.
    MvLi(Vec<i64>),
    /// Multi-valued split values.
    MvHiLo(Vec<HiLo>),
    /// Restriction tree.
    Res(Box<WireRestriction>),
    /// Rule actions.
    Actions(Vec<WireAction>),
    /// Error code in place of a value.
    Err(u32),
}

/// A tagged wire value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireProp {
    /// Raw tag.
    pub tag: u32,
    /// Value.
    pub value: WireValue,
}

/// Wire form of a restriction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireRestriction {
    /// All children.
    And(Vec<WireRestriction>),
    /// Any child.
    Or(Vec<WireRestriction>),
    /// Negation.
    Not(Box<WireRestriction>),
    /// Content match.
    Content {
        /// Fuzzy level.
        fuzzy: u32,
        /// Tested tag.
        tag: u32,
        /// Operand.
        prop: WireProp,
    },
    /// Property comparison.
    Property {
        /// Operator code.
        relop: u32,
        /// Tested tag.
        tag: u32,
        /// Operand.
        prop: WireProp,
    },
    /// Two-property comparison.
    CompareProps {
        /// Operator code.
        relop: u32,
        /// Left tag.
        left: u32,
        /// Right tag.
        right: u32,
    },
    /// Bitmask test.
    BitMask {
        /// 0 = equal zero, 1 = not equal zero.
        op: u32,
        /// Tested tag.
        tag: u32,
        /// Mask.
        mask: u32,
    },
    /// Size comparison.
    Size {
        /// Operator code.
        relop: u32,
        /// Tested tag.
        tag: u32,
        /// Size operand.
        size: u32,
    },
    /// Existence test.
    Exist {
        /// Tested tag.
        tag: u32,
    },
    /// Sub-object restriction.
    Sub {
        /// Sub-object selector.
        subobject: u32,
        /// Nested restriction.
        restriction: Box<WireRestriction>,
    },
    /// Annotated restriction.
    Comment {
        /// Annotation properties.
        props: Vec<WireProp>,
        /// Wrapped restriction.
        restriction: Option<Box<WireRestriction>>,
    },
}

/// Wire form of a rule action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireAction {
    /// Action type code.
    pub action_type: u32,
    /// Flavor flags.
    pub flavor: u32,
    /// Rule flags.
    pub flags: u32,
    /// Type-specific body.
    pub body: WireActionBody,
}

/// Type-specific body of a wire action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireActionBody {
    /// No body.
    None,
    /// Move or copy target.
    MoveCopy {
        /// Target store.
        store: Vec<u8>,
        /// Target folder.
        folder: Vec<u8>,
    },
    /// Reply template.
    Reply {
        /// Template message.
        entry_id: Vec<u8>,
        /// Template GUID bytes.
        guid: Vec<u8>,
    },
    /// Deferred action data.
    Defer(Vec<u8>),
    /// Bounce code.
    Bounce(u32),
    /// Recipient rows.
    Recipients(Vec<Vec<WireProp>>),
    /// Property to set.
    Tag(WireProp),
}

/// Converts a property to its wire form.
///
/// Fails with `TypeMismatch` if the value does not fit the tag's type. An
/// `UNSPECIFIED` tag takes the value's type; error values are sent under an
/// `ERROR`-typed tag.
pub fn marshal(prop: &Prop) -> CodecResult<WireProp> {
    let declared = prop.tag.prop_type();
    let actual = prop.value.prop_type();
    let tag = if prop.value.is_error() {
        prop.tag.with_type(PropType::ERROR)
    } else if !declared.accepts(actual) {
        return Err(CodecError::TypeMismatch {
            tag: prop.tag,
            actual,
        });
    } else if declared == PropType::UNSPECIFIED {
        prop.tag.with_type(actual)
    } else {
        prop.tag
    };
    Ok(WireProp {
        tag: tag.as_u32(),
        value: value_to_wire(&prop.value)?,
    })
}

/// Converts many properties; the first mismatch fails the batch.
pub fn marshal_all(props: &[Prop]) -> CodecResult<Vec<WireProp>> {
    props.iter().map(marshal).collect()
}

/// Converts a wire property back. Never fails: a discriminant that does not
/// match the tag's type yields an error slot carrying `NOT_FOUND`.
pub fn unmarshal(wire: &WireProp) -> Prop {
    let tag = PropTag(wire.tag);
    if let WireValue::Err(code) = wire.value {
        return Prop::error(tag, ErrorCode(code));
    }
    match value_from_wire(tag.prop_type(), &wire.value) {
        Some(value) => Prop::new(tag, value),
        None => Prop::error(tag, ErrorCode::NOT_FOUND),
    }
}

/// Converts many wire properties, one slot per input.
pub fn unmarshal_all(wire: &[WireProp]) -> Vec<Prop> {
    wire.iter().map(unmarshal).collect()
}

fn value_to_wire(value: &PropertyValue) -> CodecResult<WireValue> {
    use PropertyValue as V;
    Ok(match value {
        V::Null => WireValue::Null,
        V::I2(v) => WireValue::I(*v),
        V::Long(v) => WireValue::Ul(*v as u32),
        V::R4(v) => WireValue::Flt(*v),
        V::Double(v) | V::AppTime(v) => WireValue::Dbl(*v),
        V::Currency(v) | V::SysTime(v) => WireValue::HiLo(*v),
        V::Error(code) => WireValue::Err(code.as_u32()),
        V::Boolean(v) => WireValue::B(*v),
        V::I8(v) => WireValue::Li(*v),
        V::String8(bytes) => WireValue::Str(narrow_to_wide(bytes)),
        V::Unicode(text) => WireValue::Str(text.clone()),
        V::Clsid(guid) => WireValue::Bin(guid.as_bytes().to_vec()),
        V::Binary(bytes) => WireValue::Bin(bytes.clone()),
        V::MvI2(v) => WireValue::MvI(v.clone()),
        V::MvLong(v) => WireValue::MvL(v.iter().map(|x| *x as u32).collect()),
        V::MvR4(v) => WireValue::MvFlt(v.clone()),
        V::MvDouble(v) | V::MvAppTime(v) => WireValue::MvDbl(v.clone()),
        V::MvCurrency(v) | V::MvSysTime(v) => WireValue::MvHiLo(v.clone()),
        V::MvI8(v) => WireValue::MvLi(v.clone()),
        V::MvString8(v) => WireValue::MvStr(v.iter().map(|b| narrow_to_wide(b)).collect()),
        V::MvUnicode(v) => WireValue::MvStr(v.clone()),
        V::MvClsid(v) => WireValue::MvBin(v.iter().map(|g| g.as_bytes().to_vec()).collect()),
        V::MvBinary(v) => WireValue::MvBin(v.clone()),
        V::Restriction(r) => WireValue::Res(Box::new(restriction_to_wire(r)?)),
        V::Actions(actions) => {
            WireValue::Actions(actions.iter().map(action_to_wire).collect::<CodecResult<_>>()?)
        }
    })
}

fn guid_from(bytes: &[u8]) -> Option<Uuid> {
    Uuid::from_slice(bytes).ok()
}

fn value_from_wire(ty: PropType, wire: &WireValue) -> Option<PropertyValue> {
    use PropertyValue as V;
    let value = match (ty, wire) {
        (PropType::NULL, WireValue::Null) => V::Null,
        (PropType::I2, WireValue::I(v)) => V::I2(*v),
        (PropType::LONG, WireValue::Ul(v)) => V::Long(*v as i32),
        (PropType::R4, WireValue::Flt(v)) => V::R4(*v),
        (PropType::DOUBLE, WireValue::Dbl(v)) => V::Double(*v),
        (PropType::APPTIME, WireValue::Dbl(v)) => V::AppTime(*v),
        (PropType::CURRENCY, WireValue::HiLo(v)) => V::Currency(*v),
        (PropType::SYSTIME, WireValue::HiLo(v)) => V::SysTime(*v),
        (PropType::BOOLEAN, WireValue::B(v)) => V::Boolean(*v),
        (PropType::I8, WireValue::Li(v)) => V::I8(*v),
        (PropType::STRING8 | PropType::UNICODE, WireValue::Str(s)) => V::Unicode(s.clone()),
        (PropType::CLSID, WireValue::Bin(b)) => V::Clsid(guid_from(b)?),
        (PropType::BINARY, WireValue::Bin(b)) => V::Binary(b.clone()),
        (PropType::MV_I2, WireValue::MvI(v)) => V::MvI2(v.clone()),
        (PropType::MV_LONG, WireValue::MvL(v)) => V::MvLong(v.iter().map(|x| *x as i32).collect()),
        (PropType::MV_R4, WireValue::MvFlt(v)) => V::MvR4(v.clone()),
        (PropType::MV_DOUBLE, WireValue::MvDbl(v)) => V::MvDouble(v.clone()),
        (PropType::MV_APPTIME, WireValue::MvDbl(v)) => V::MvAppTime(v.clone()),
        (PropType::MV_CURRENCY, WireValue::MvHiLo(v)) => V::MvCurrency(v.clone()),
        (PropType::MV_SYSTIME, WireValue::MvHiLo(v)) => V::MvSysTime(v.clone()),
        (PropType::MV_I8, WireValue::MvLi(v)) => V::MvI8(v.clone()),
        (PropType::MV_STRING8 | PropType::MV_UNICODE, WireValue::MvStr(v)) => V::MvUnicode(v.clone()),
        (PropType::MV_CLSID, WireValue::MvBin(v)) => {
            V::MvClsid(v.iter().map(|b| guid_from(b)).collect::<Option<_>>()?)
        }
        (PropType::MV_BINARY, WireValue::MvBin(v)) => V::MvBinary(v.clone()),
        (PropType::SRESTRICTION, WireValue::Res(r)) => {
            V::Restriction(Box::new(restriction_from_wire(r).ok()?))
        }
        (PropType::ACTIONS, WireValue::Actions(actions)) => V::Actions(
            actions
                .iter()
                .map(action_from_wire)
                .collect::<CodecResult<_>>()
                .ok()?,
        ),
        _ => return None,
    };
    Some(value)
}

fn relop_from(code: u32) -> CodecResult<RelOp> {
    RelOp::from_code(code).ok_or_else(|| CodecError::invalid_value(format!("unknown relop {code}")))
}

/// Converts a restriction tree to its wire form.
pub fn restriction_to_wire(r: &Restriction) -> CodecResult<WireRestriction> {
    let many = |children: &[Restriction]| -> CodecResult<Vec<WireRestriction>> {
        children.iter().map(restriction_to_wire).collect()
    };
    Ok(match r {
        Restriction::And(children) => WireRestriction::And(many(children)?),
        Restriction::Or(children) => WireRestriction::Or(many(children)?),
        Restriction::Not(child) => WireRestriction::Not(Box::new(restriction_to_wire(child)?)),
        Restriction::Content { fuzzy, tag, value } => WireRestriction::Content {
            fuzzy: fuzzy.0,
            tag: tag.as_u32(),
            prop: marshal(value)?,
        },
        Restriction::Property { relop, tag, value } => WireRestriction::Property {
            relop: relop.to_code(),
            tag: tag.as_u32(),
            prop: marshal(value)?,
        },
        Restriction::CompareProps { relop, left, right } => WireRestriction::CompareProps {
            relop: relop.to_code(),
            left: left.as_u32(),
            right: right.as_u32(),
        },
        Restriction::BitMask { op, tag, mask } => WireRestriction::BitMask {
            op: match op {
                BitMaskOp::EqualZero => 0,
                BitMaskOp::NotEqualZero => 1,
            },
            tag: tag.as_u32(),
            mask: *mask,
        },
        Restriction::Size { relop, tag, size } => WireRestriction::Size {
            relop: relop.to_code(),
            tag: tag.as_u32(),
            size: *size,
        },
        Restriction::Exist { tag } => WireRestriction::Exist { tag: tag.as_u32() },
        Restriction::SubRestriction {
            subobject,
            restriction,
        } => WireRestriction::Sub {
            subobject: subobject.as_u32(),
            restriction: Box::new(restriction_to_wire(restriction)?),
        },
        Restriction::Comment { props, restriction } => WireRestriction::Comment {
            props: marshal_all(props)?,
            restriction: match restriction {
                Some(r) => Some(Box::new(restriction_to_wire(r)?)),
                None => None,
            },
        },
    })
}

/// Converts a wire restriction back. Unknown operator codes are rejected;
/// nested values follow `unmarshal` and never fail.
pub fn restriction_from_wire(w: &WireRestriction) -> CodecResult<Restriction> {
    let many = |children: &[WireRestriction]| -> CodecResult<Vec<Restriction>> {
        children.iter().map(restriction_from_wire).collect()
    };
    Ok(match w {
        WireRestriction::And(children) => Restriction::And(many(children)?),
        WireRestriction::Or(children) => Restriction::Or(many(children)?),
        WireRestriction::Not(child) => Restriction::Not(Box::new(restriction_from_wire(child)?)),
        WireRestriction::Content { fuzzy, tag, prop } => Restriction::Content {
            fuzzy: FuzzyLevel(*fuzzy),
            tag: PropTag(*tag),
            value: unmarshal(prop),
        },
        WireRestriction::Property { relop, tag, prop } => Restriction::Property {
            relop: relop_from(*relop)?,
            tag: PropTag(*tag),
            value: unmarshal(prop),
        },
        WireRestriction::CompareProps { relop, left, right } => Restriction::CompareProps {
            relop: relop_from(*relop)?,
            left: PropTag(*left),
            right: PropTag(*right),
        },
        WireRestriction::BitMask { op, tag, mask } => Restriction::BitMask {
            op: match op {
                0 => BitMaskOp::EqualZero,
                1 => BitMaskOp::NotEqualZero,
                other => {
                    return Err(CodecError::invalid_value(format!("unknown bitmask op {other}")))
                }
            },
            tag: PropTag(*tag),
            mask: *mask,
        },
        WireRestriction::Size { relop, tag, size } => Restriction::Size {
            relop: relop_from(*relop)?,
            tag: PropTag(*tag),
            size: *size,
        },
        WireRestriction::Exist { tag } => Restriction::Exist { tag: PropTag(*tag) },
        WireRestriction::Sub {
            subobject,
            restriction,
        } => Restriction::SubRestriction {
            subobject: PropTag(*subobject),
            restriction: Box::new(restriction_from_wire(restriction)?),
        },
        WireRestriction::Comment { props, restriction } => Restriction::Comment {
            props: unmarshal_all(props),
            restriction: match restriction {
                Some(r) => Some(Box::new(restriction_from_wire(r)?)),
                None => None,
            },
        },
    })
}

fn rows_to_wire(rows: &[PropRow]) -> CodecResult<Vec<Vec<WireProp>>> {
    rows.iter().map(|row| marshal_all(row)).collect()
}

pub(crate) fn action_to_wire(action: &Action) -> CodecResult<WireAction> {
    let body = match &action.kind {
        ActionKind::Move {
            store_entry_id,
            folder_entry_id,
        }
        | ActionKind::Copy {
            store_entry_id,
            folder_entry_id,
        } => WireActionBody::MoveCopy {
            store: store_entry_id.clone(),
            folder: folder_entry_id.clone(),
        },
        ActionKind::Reply { entry_id, template } | ActionKind::OofReply { entry_id, template } => {
            WireActionBody::Reply {
                entry_id: entry_id.clone(),
                guid: template.as_bytes().to_vec(),
            }
        }
        ActionKind::Defer { data } => WireActionBody::Defer(data.clone()),
        ActionKind::Bounce { code } => WireActionBody::Bounce(*code),
        ActionKind::Forward { recipients } | ActionKind::Delegate { recipients } => {
            WireActionBody::Recipients(rows_to_wire(recipients)?)
        }
        ActionKind::Tag { prop } => WireActionBody::Tag(marshal(prop)?),
        ActionKind::Delete | ActionKind::MarkAsRead => WireActionBody::None,
    };
    Ok(WireAction {
        action_type: action.kind.to_code(),
        flavor: action.flavor,
        flags: action.flags,
        body,
    })
}

fn action_from_wire(w: &WireAction) -> CodecResult<Action> {
    let bad = || CodecError::invalid_value(format!("malformed action of type {}", w.action_type));
    let template = |guid: &[u8]| guid_from(guid).ok_or_else(bad);
    let rows = |rows: &[Vec<WireProp>]| -> Vec<PropRow> { rows.iter().map(|r| unmarshal_all(r)).collect() };
    let kind = match (w.action_type, &w.body) {
        (1, WireActionBody::MoveCopy { store, folder }) => ActionKind::Move {
            store_entry_id: store.clone(),
            folder_entry_id: folder.clone(),
        },
        (2, WireActionBody::MoveCopy { store, folder }) => ActionKind::Copy {
            store_entry_id: store.clone(),
            folder_entry_id: folder.clone(),
        },
        (3, WireActionBody::Reply { entry_id, guid }) => ActionKind::Reply {
            entry_id: entry_id.clone(),
            template: template(guid)?,
        },
        (4, WireActionBody::Reply { entry_id, guid }) => ActionKind::OofReply {
            entry_id: entry_id.clone(),
            template: template(guid)?,
        },
        (5, WireActionBody::Defer(data)) => ActionKind::Defer { data: data.clone() },
        (6, WireActionBody::Bounce(code)) => ActionKind::Bounce { code: *code },
        (7, WireActionBody::Recipients(r)) => ActionKind::Forward { recipients: rows(r) },
        (8, WireActionBody::Recipients(r)) => ActionKind::Delegate { recipients: rows(r) },
        (9, WireActionBody::Tag(prop)) => ActionKind::Tag {
            prop: unmarshal(prop),
        },
        (10, WireActionBody::None) => ActionKind::Delete,
        (11, WireActionBody::None) => ActionKind::MarkAsRead,
        _ => return Err(bad()),
    };
    Ok(Action {
        kind,
        flavor: w.flavor,
        flags: w.flags,
    })
}
