//! Fuzz testing harnesses for mapisync.
//!
//! This module provides fuzz targets that can be used with cargo-fuzz
//! or other fuzzing frameworks. Every target must return normally for any
//! input.

use crate::generators::CacheOperation;
use mapisync_codec::{
    from_cbor, restriction_from_wire, tags, unmarshal, Decode, Prop, PropTag, PropType,
    PropertyValue, WireProp, WireRestriction,
};
use mapisync_core::PropertyCache;
use mapisync_entryid::{decode, is_same_object, peek_version, unwrap, EntryIdView};
use mapisync_protocol::{RequestFrame, ResponseFrame};

/// Fuzz target for entry-id decoding.
///
/// Arbitrary bytes either decode or yield an error, and every id names the
/// same object as itself.
pub fn fuzz_entry_id_decode(data: &[u8]) {
    if let Ok(view) = decode(data) {
        let _ = view.shape();
        let _ = view.guid();
        let _ = view.encode();
        let _ = view.innermost();
    }
    let _ = peek_version(data);
    let _ = unwrap(data);
    assert!(is_same_object(data, data), "entry id differs from itself");
}

/// Fuzz target for entry-id re-encoding.
///
/// A decoded id that is re-encoded must decode again to the same object.
pub fn fuzz_entry_id_reencode(data: &[u8]) {
    let Ok(view) = decode(data) else {
        return;
    };
    if matches!(view, EntryIdView::Wrapped(_)) {
        return;
    }
    let encoded = view.encode();
    assert!(decode(&encoded).is_ok(), "re-encoded id does not decode");
    assert!(
        is_same_object(data, &encoded),
        "re-encoding changed the named object"
    );
}

/// Fuzz target for wire decoding.
///
/// Frames, property values and restrictions never panic on malformed input;
/// unmarshalling always yields a slot.
pub fn fuzz_wire_decode(data: &[u8]) {
    let _ = RequestFrame::decode(data);
    let _ = ResponseFrame::decode(data).map(ResponseFrame::into_result);
    if let Ok(wire) = from_cbor::<WireProp>(data) {
        let _ = unmarshal(&wire);
    }
    if let Ok(wire) = from_cbor::<WireRestriction>(data) {
        let _ = restriction_from_wire(&wire);
    }
}

/// Decodes fuzz input into cache operations.
///
/// Each operation takes four bytes: kind, id, type selector and a value
/// byte.
pub fn cache_operations_from_bytes(data: &[u8]) -> Vec<CacheOperation> {
    data.chunks_exact(4)
        .map(|chunk| {
            let id = u16::from(chunk[1] % 8) + 1;
            let value = match chunk[2] % 4 {
                0 => PropertyValue::Long(i32::from(chunk[3])),
                1 => PropertyValue::Unicode(char::from(chunk[3]).to_string()),
                2 => PropertyValue::Binary(vec![chunk[3]; usize::from(chunk[3] % 16)]),
                _ => PropertyValue::Boolean(chunk[3] % 2 == 0),
            };
            let prop = Prop::new(PropTag::new(id, value.prop_type()), value);
            match chunk[0] % 5 {
                0 => CacheOperation::Set(prop),
                1 => CacheOperation::Delete(prop.tag),
                2 => CacheOperation::Announce(prop.tag),
                3 => CacheOperation::Load(prop),
                _ => CacheOperation::MarkClean,
            }
        })
        .collect()
}

/// Applies `ops` to `cache`, ignoring rejected operations.
pub fn apply_cache_operations(cache: &mut PropertyCache, ops: &[CacheOperation]) {
    for op in ops {
        match op {
            CacheOperation::Set(prop) => {
                let _ = cache.set(prop.tag, &prop.value);
            }
            CacheOperation::Delete(tag) => {
                let _ = cache.delete(*tag);
            }
            CacheOperation::Announce(tag) => cache.insert_available(*tag),
            CacheOperation::Load(prop) => {
                let _ = cache.insert_loaded(prop);
            }
            CacheOperation::MarkClean => cache.mark_clean(),
        }
    }
}

/// Checks the cache invariants: no tag is both present and queued for
/// deletion, and at most one entry exists per id.
pub fn check_cache_invariants(cache: &PropertyCache) {
    let mut seen = std::collections::BTreeSet::new();
    for entry in cache.entries() {
        let tag = entry.tag();
        assert!(seen.insert(tag.id()), "two entries for id {:#06x}", tag.id());
        if tag.prop_type() != PropType::UNSPECIFIED {
            assert!(!cache.is_deleted(tag), "{tag} is both present and deleted");
        }
        if entry.is_dirty() {
            assert!(entry.is_loaded(), "{tag} is dirty without a value");
        }
    }
    for tag in cache.deleted_tags() {
        assert!(
            cache.entry(tag).map_or(true, |entry| entry.tag() != tag),
            "{tag} is deleted but still cached"
        );
    }
}

/// Fuzz target for cache operation sequences.
pub fn fuzz_cache_operations(data: &[u8]) {
    let mut cache = PropertyCache::new();
    apply_cache_operations(&mut cache, &cache_operations_from_bytes(data));
    check_cache_invariants(&cache);
    let _ = cache.get(tags::PR_SUBJECT);
}
