//! Property-based test generators using proptest.
//!
//! Provides strategies for property values (restriction trees and rule
//! actions included), entry ids and cache operation sequences.

use mapisync_codec::{
    Action, ActionKind, BitMaskOp, FuzzyLevel, HiLo, Prop, PropRow, PropTag, PropType,
    PropertyValue, RelOp, Restriction,
};
use mapisync_entryid::{
    wrap, AbEntryId, ObjectType, StoreEntryId, AB_PROVIDER_GUID, WRAPPED_STORE_GUID,
};
use proptest::prelude::*;
use uuid::Uuid;

/// Strategy for generating object types.
pub fn object_type_strategy() -> impl Strategy<Value = ObjectType> {
    prop_oneof![
        Just(ObjectType::Store),
        Just(ObjectType::AddressBook),
        Just(ObjectType::Folder),
        Just(ObjectType::AbContainer),
        Just(ObjectType::Message),
        Just(ObjectType::MailUser),
        Just(ObjectType::Attachment),
        Just(ObjectType::DistList),
    ]
}

/// Strategy for generating GUIDs.
pub fn guid_strategy() -> impl Strategy<Value = Uuid> {
    prop::array::uniform16(any::<u8>()).prop_map(Uuid::from_bytes)
}

/// Strategy for generating store GUIDs, which never collide with the
/// provider GUIDs that select other id shapes.
pub fn store_guid_strategy() -> impl Strategy<Value = Uuid> {
    guid_strategy().prop_filter("reserved provider GUID", |guid| {
        *guid != AB_PROVIDER_GUID && *guid != WRAPPED_STORE_GUID
    })
}

fn ascii_strategy(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0x21u8..0x7F, len)
}

/// Strategy for generating text values.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 äöü]{0,24}").expect("Invalid regex")
}

fn f64_strategy() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::ZERO
}

fn f32_strategy() -> impl Strategy<Value = f32> {
    prop::num::f32::NORMAL | prop::num::f32::ZERO
}

fn hilo_strategy() -> impl Strategy<Value = HiLo> {
    any::<i64>().prop_map(HiLo::from_i64)
}

fn bytes_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for generating values of every stored type.
///
/// Narrow text is never stored, so it is not generated; neither are error
/// values.
pub fn stored_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        4 => numeric_value_strategy(),
        3 => other_value_strategy(),
        4 => multi_value_strategy(),
        1 => restriction_strategy().prop_map(|r| PropertyValue::Restriction(Box::new(r))),
        1 => actions_strategy().prop_map(PropertyValue::Actions),
    ]
}

fn numeric_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        any::<i16>().prop_map(PropertyValue::I2),
        any::<i32>().prop_map(PropertyValue::Long),
        f32_strategy().prop_map(PropertyValue::R4),
        f64_strategy().prop_map(PropertyValue::Double),
        hilo_strategy().prop_map(PropertyValue::Currency),
        f64_strategy().prop_map(PropertyValue::AppTime),
        any::<i64>().prop_map(PropertyValue::I8),
        hilo_strategy().prop_map(PropertyValue::SysTime),
    ]
}

fn other_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        Just(PropertyValue::Null),
        any::<bool>().prop_map(PropertyValue::Boolean),
        text_strategy().prop_map(PropertyValue::Unicode),
        guid_strategy().prop_map(PropertyValue::Clsid),
        bytes_strategy().prop_map(PropertyValue::Binary),
    ]
}

fn multi_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        prop::collection::vec(any::<i16>(), 0..4).prop_map(PropertyValue::MvI2),
        prop::collection::vec(any::<i32>(), 0..4).prop_map(PropertyValue::MvLong),
        prop::collection::vec(f32_strategy(), 0..4).prop_map(PropertyValue::MvR4),
        prop::collection::vec(f64_strategy(), 0..4).prop_map(PropertyValue::MvDouble),
        prop::collection::vec(hilo_strategy(), 0..4).prop_map(PropertyValue::MvCurrency),
        prop::collection::vec(any::<i64>(), 0..4).prop_map(PropertyValue::MvI8),
        prop::collection::vec(text_strategy(), 0..4).prop_map(PropertyValue::MvUnicode),
        prop::collection::vec(hilo_strategy(), 0..4).prop_map(PropertyValue::MvSysTime),
        prop::collection::vec(guid_strategy(), 0..4).prop_map(PropertyValue::MvClsid),
        prop::collection::vec(bytes_strategy(), 0..4).prop_map(PropertyValue::MvBinary),
    ]
}

fn scalar_prop_strategy() -> impl Strategy<Value = Prop> {
    (
        1u16..0x100,
        prop_oneof![numeric_value_strategy(), other_value_strategy()],
    )
        .prop_map(|(id, value)| Prop::new(PropTag::new(id, value.prop_type()), value))
}

fn tag_strategy() -> impl Strategy<Value = PropTag> {
    (
        1u16..0x100,
        prop_oneof![
            Just(PropType::LONG),
            Just(PropType::UNICODE),
            Just(PropType::BINARY),
            Just(PropType::SYSTIME),
        ],
    )
        .prop_map(|(id, ty)| PropTag::new(id, ty))
}

fn relop_strategy() -> impl Strategy<Value = RelOp> {
    prop_oneof![
        Just(RelOp::Lt),
        Just(RelOp::Le),
        Just(RelOp::Gt),
        Just(RelOp::Ge),
        Just(RelOp::Eq),
        Just(RelOp::Ne),
        Just(RelOp::Re),
    ]
}

/// Strategy for generating restriction trees up to three levels deep.
pub fn restriction_strategy() -> impl Strategy<Value = Restriction> {
    let leaf = prop_oneof![
        tag_strategy().prop_map(|tag| Restriction::Exist { tag }),
        (relop_strategy(), tag_strategy(), any::<u32>())
            .prop_map(|(relop, tag, size)| Restriction::Size { relop, tag, size }),
        (relop_strategy(), tag_strategy(), tag_strategy())
            .prop_map(|(relop, left, right)| Restriction::CompareProps { relop, left, right }),
        (any::<bool>(), tag_strategy(), any::<u32>()).prop_map(|(zero, tag, mask)| {
            let op = if zero {
                BitMaskOp::EqualZero
            } else {
                BitMaskOp::NotEqualZero
            };
            Restriction::BitMask { op, tag, mask }
        }),
        (relop_strategy(), scalar_prop_strategy()).prop_map(|(relop, value)| {
            Restriction::Property {
                relop,
                tag: value.tag,
                value,
            }
        }),
        (any::<u32>(), scalar_prop_strategy()).prop_map(|(fuzzy, value)| {
            Restriction::Content {
                fuzzy: FuzzyLevel(fuzzy),
                tag: value.tag,
                value,
            }
        }),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Restriction::And),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Restriction::Or),
            inner.clone().prop_map(|r| Restriction::Not(Box::new(r))),
            (tag_strategy(), inner.clone()).prop_map(|(subobject, r)| {
                Restriction::SubRestriction {
                    subobject,
                    restriction: Box::new(r),
                }
            }),
            (
                prop::collection::vec(scalar_prop_strategy(), 0..3),
                prop::option::of(inner),
            )
                .prop_map(|(props, r)| Restriction::Comment {
                    props,
                    restriction: r.map(Box::new),
                }),
        ]
    })
}

fn recipients_strategy() -> impl Strategy<Value = Vec<PropRow>> {
    prop::collection::vec(prop::collection::vec(scalar_prop_strategy(), 0..3), 0..3)
}

fn action_kind_strategy() -> impl Strategy<Value = ActionKind> {
    prop_oneof![
        (bytes_strategy(), bytes_strategy()).prop_map(|(store_entry_id, folder_entry_id)| {
            ActionKind::Move {
                store_entry_id,
                folder_entry_id,
            }
        }),
        (bytes_strategy(), bytes_strategy()).prop_map(|(store_entry_id, folder_entry_id)| {
            ActionKind::Copy {
                store_entry_id,
                folder_entry_id,
            }
        }),
        (bytes_strategy(), guid_strategy())
            .prop_map(|(entry_id, template)| ActionKind::Reply { entry_id, template }),
        (bytes_strategy(), guid_strategy())
            .prop_map(|(entry_id, template)| ActionKind::OofReply { entry_id, template }),
        bytes_strategy().prop_map(|data| ActionKind::Defer { data }),
        any::<u32>().prop_map(|code| ActionKind::Bounce { code }),
        recipients_strategy().prop_map(|recipients| ActionKind::Forward { recipients }),
        recipients_strategy().prop_map(|recipients| ActionKind::Delegate { recipients }),
        scalar_prop_strategy().prop_map(|prop| ActionKind::Tag { prop }),
        prop_oneof![Just(ActionKind::Delete), Just(ActionKind::MarkAsRead)],
    ]
}

/// Strategy for generating rule action lists.
pub fn actions_strategy() -> impl Strategy<Value = Vec<Action>> {
    prop::collection::vec(
        (action_kind_strategy(), any::<u32>(), any::<u32>()).prop_map(|(kind, flavor, flags)| {
            Action {
                kind,
                flavor,
                flags,
            }
        }),
        0..4,
    )
}

/// Strategy for generating properties whose tag type matches the value.
///
/// Ids are drawn from `ids`; a narrow range makes collisions likely.
pub fn prop_strategy(ids: std::ops::Range<u16>) -> impl Strategy<Value = Prop> {
    (ids, stored_value_strategy())
        .prop_map(|(id, value)| Prop::new(PropTag::new(id, value.prop_type()), value))
}

/// Strategy for generating encoded store entry ids of both versions.
pub fn store_entry_id_strategy() -> impl Strategy<Value = Vec<u8>> {
    (
        store_guid_strategy(),
        object_type_strategy(),
        any::<u32>(),
        prop::option::of(guid_strategy()),
        ascii_strategy(0..16),
    )
        .prop_map(|(store, object_type, local_id, object_guid, path)| {
            let id = match object_guid {
                Some(object_guid) => StoreEntryId::v1(store, object_type, object_guid),
                None => StoreEntryId::v0(store, object_type, local_id),
            };
            id.with_server_path(&path).encode()
        })
}

/// Strategy for generating encoded address-book entry ids of both versions.
pub fn ab_entry_id_strategy() -> impl Strategy<Value = Vec<u8>> {
    (
        object_type_strategy(),
        any::<u32>(),
        prop::option::of(ascii_strategy(1..24)),
    )
        .prop_map(|(object_type, local_id, external)| match external {
            Some(external) => AbEntryId::v1(object_type, local_id, &external).encode(),
            None => AbEntryId::v0(object_type, local_id).encode(),
        })
}

/// Strategy for generating a provider name for wrapping.
pub fn dll_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,12}\\.dll").expect("Invalid regex")
}

/// Strategy for generating encoded entry ids of any shape, wrapped ones
/// included.
pub fn entry_id_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        3 => store_entry_id_strategy(),
        2 => ab_entry_id_strategy(),
        1 => (store_entry_id_strategy(), dll_name_strategy()).prop_map(|(inner, dll)| {
            wrap(&inner, &dll).expect("Generated provider names contain no NUL")
        }),
    ]
}

/// An operation on a property cache.
#[derive(Debug, Clone)]
pub enum CacheOperation {
    /// Write a value.
    Set(Prop),
    /// Delete a tag.
    Delete(PropTag),
    /// The server reports a tag without its value.
    Announce(PropTag),
    /// The server supplies a value.
    Load(Prop),
    /// A save succeeded.
    MarkClean,
}

/// Strategy for generating cache operations over a handful of ids.
pub fn cache_operation_strategy() -> impl Strategy<Value = CacheOperation> {
    let ids = 0x0001u16..0x0008;
    prop_oneof![
        4 => prop_strategy(ids.clone()).prop_map(CacheOperation::Set),
        2 => prop_strategy(ids.clone()).prop_map(|p| CacheOperation::Delete(p.tag)),
        2 => prop_strategy(ids.clone()).prop_map(|p| CacheOperation::Announce(p.tag)),
        2 => prop_strategy(ids).prop_map(CacheOperation::Load),
        1 => Just(CacheOperation::MarkClean),
    ]
}

/// Strategy for generating a sequence of cache operations.
pub fn cache_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<CacheOperation>> {
    prop::collection::vec(cache_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
