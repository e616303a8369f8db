//! Property cache with available, loaded and dirty states.

use crate::entry::{EntryState, PropertyEntry};
use crate::error::{CoreError, CoreResult};
use crate::handler::HandlerTable;
use mapisync_codec::{ErrorCode, Prop, PropTag, PropType, PropertyValue};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Type under which a value of type `ty` is kept in the cache.
pub(crate) fn stored_type(ty: PropType) -> PropType {
    match ty {
        PropType::STRING8 => PropType::UNICODE,
        PropType::MV_STRING8 => PropType::MV_UNICODE,
        other => other,
    }
}

/// Cache of an object's properties, keyed by property id.
///
/// A tag is never present both as an entry and in the deleted set.
#[derive(Debug, Clone, Default)]
pub struct PropertyCache {
    entries: BTreeMap<u16, PropertyEntry>,
    deleted: BTreeSet<PropTag>,
}

impl PropertyCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `tag`, shaped for the requested type.
    ///
    /// Unknown ids and incompatible types are `NotFound`. A tag that is known
    /// but not fetched is `DemandLoadRequired`.
    pub fn get(&self, tag: PropTag) -> CoreResult<PropertyValue> {
        let entry = self
            .entries
            .get(&tag.id())
            .ok_or_else(|| CoreError::not_found(tag))?;
        let stored = entry.tag();
        match entry.value() {
            None if stored.prop_type() == PropType::UNSPECIFIED || tag.accepts(stored) => {
                Err(CoreError::DemandLoadRequired { tag })
            }
            Some(value) if tag.accepts(stored) => Ok(value.coerce_to(tag.prop_type())),
            _ => Err(CoreError::not_found(tag)),
        }
    }

    /// Returns the entry for `tag`'s id.
    pub fn entry(&self, tag: PropTag) -> Option<&PropertyEntry> {
        self.entries.get(&tag.id())
    }

    /// Returns the state of the entry for `tag`'s id.
    pub fn state(&self, tag: PropTag) -> Option<EntryState> {
        self.entry(tag).map(PropertyEntry::state)
    }

    /// Writes a value and marks it dirty.
    ///
    /// A write whose concrete type differs from the stored entry replaces it:
    /// the old tag is queued for deletion and a fresh entry is created.
    pub fn set(&mut self, tag: PropTag, value: &PropertyValue) -> CoreResult<()> {
        if value.is_error() {
            return Err(CoreError::invalid_parameter(format!(
                "cannot store an error value under {tag}"
            )));
        }
        if !tag.prop_type().accepts(value.prop_type()) {
            return Err(CoreError::invalid_parameter(format!(
                "value of type {} does not match {tag}",
                value.prop_type()
            )));
        }
        let stored_tag = PropTag::new(tag.id(), stored_type(value.prop_type()));

        let replace = self
            .entries
            .get(&tag.id())
            .is_some_and(|entry| entry.tag() != stored_tag);
        if replace {
            if let Some(old) = self.entries.remove(&tag.id()) {
                debug!(old = %old.tag(), new = %stored_tag, "property type redefined");
                if old.tag().prop_type() != PropType::UNSPECIFIED {
                    self.deleted.insert(old.tag());
                }
            }
        }

        self.entries
            .entry(tag.id())
            .or_insert_with(|| PropertyEntry::available(stored_tag))
            .set(value)?;
        self.deleted.remove(&stored_tag);
        Ok(())
    }

    /// Drops the entry for `tag` and queues it for server-side deletion.
    pub fn delete(&mut self, tag: PropTag) -> CoreResult<()> {
        let stored = match self.entries.get(&tag.id()) {
            Some(entry) if tag.accepts(entry.tag()) => entry.tag(),
            _ => return Err(CoreError::not_found(tag)),
        };
        self.entries.remove(&tag.id());
        if stored.prop_type() != PropType::UNSPECIFIED {
            self.deleted.insert(stored);
        }
        Ok(())
    }

    /// Records that the server has `tag` without fetching its value.
    ///
    /// Loaded entries are never demoted, and a pending local deletion wins.
    pub fn insert_available(&mut self, tag: PropTag) {
        if self.deleted.iter().any(|deleted| deleted.id() == tag.id()) {
            return;
        }
        match self.entries.get(&tag.id()) {
            Some(entry) if entry.is_loaded() => {}
            _ => {
                self.entries.insert(tag.id(), PropertyEntry::available(tag));
            }
        }
    }

    /// Inserts a server-supplied value as loaded and clean.
    ///
    /// An error slot carrying `NOT_ENOUGH_MEMORY` marks the tag available.
    /// Other error slots are ignored.
    pub fn insert_loaded(&mut self, prop: &Prop) -> CoreResult<()> {
        match prop.as_error() {
            Some(ErrorCode::NOT_ENOUGH_MEMORY) => {
                if !self.entries.contains_key(&prop.tag.id()) {
                    self.insert_available(prop.tag.with_type(PropType::UNSPECIFIED));
                }
                Ok(())
            }
            Some(_) => Ok(()),
            None => {
                let tag = PropTag::new(prop.tag.id(), stored_type(prop.value.prop_type()));
                match self.entries.get_mut(&tag.id()) {
                    Some(entry) if entry.tag() == tag => entry.load(&prop.value)?,
                    _ => {
                        self.entries
                            .insert(tag.id(), PropertyEntry::loaded(tag, prop.value.clone()));
                    }
                }
                self.deleted.remove(&tag);
                Ok(())
            }
        }
    }

    /// Clears every dirty flag and the deleted set.
    pub fn mark_clean(&mut self) {
        for entry in self.entries.values_mut() {
            entry.mark_clean();
        }
        self.deleted.clear();
    }

    /// Drops every entry and pending deletion.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.deleted.clear();
    }

    /// Lists known tags merged with the computed tags of `handlers`.
    pub fn list_tags(&self, handlers: &HandlerTable) -> Vec<PropTag> {
        let mut tags: BTreeMap<u16, PropTag> = self
            .entries
            .values()
            .map(|entry| (entry.tag().id(), entry.tag()))
            .collect();
        for tag in handlers.computed_tags() {
            tags.entry(tag.id()).or_insert(tag);
        }
        tags.into_values().collect()
    }

    /// Returns the dirty values, in id order.
    pub fn dirty_props(&self) -> Vec<Prop> {
        self.entries
            .values()
            .filter(|entry| entry.is_dirty())
            .filter_map(|entry| entry.value().map(|v| Prop::new(entry.tag(), v.clone())))
            .collect()
    }

    /// Returns the tags queued for deletion.
    pub fn deleted_tags(&self) -> Vec<PropTag> {
        self.deleted.iter().copied().collect()
    }

    /// Returns true if `tag` is queued for deletion.
    pub fn is_deleted(&self, tag: PropTag) -> bool {
        self.deleted.contains(&tag)
    }

    /// Returns true if anything awaits write-back.
    pub fn is_dirty(&self) -> bool {
        !self.deleted.is_empty() || self.entries.values().any(PropertyEntry::is_dirty)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &PropertyEntry> {
        self.entries.values()
    }

    /// Sum of the logical sizes of every loaded value.
    pub fn loaded_size(&self) -> usize {
        self.entries
            .values()
            .filter_map(PropertyEntry::value)
            .map(PropertyValue::size)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapisync_codec::tags;

    fn subject(text: &str) -> PropertyValue {
        PropertyValue::Unicode(text.into())
    }

    #[test]
    fn unknown_tag_is_not_found() {
        let cache = PropertyCache::new();
        assert_eq!(
            cache.get(tags::PR_SUBJECT),
            Err(CoreError::not_found(tags::PR_SUBJECT))
        );
    }

    #[test]
    fn available_tag_needs_demand_load() {
        let mut cache = PropertyCache::new();
        cache.insert_available(tags::PR_BODY);
        let err = cache.get(tags::PR_BODY).unwrap_err();
        assert_eq!(err, CoreError::DemandLoadRequired { tag: tags::PR_BODY });
        assert_eq!(err.code(), ErrorCode::NOT_ENOUGH_MEMORY);
    }

    #[test]
    fn narrow_request_of_wide_value() {
        let mut cache = PropertyCache::new();
        cache.set(tags::PR_SUBJECT, &subject("Re: caf\u{e9}")).unwrap();

        let narrow = tags::PR_SUBJECT.with_type(PropType::STRING8);
        assert_eq!(
            cache.get(narrow).unwrap(),
            PropertyValue::String8(b"Re: caf\xe9".to_vec())
        );
        assert_eq!(cache.get(tags::PR_SUBJECT).unwrap(), subject("Re: caf\u{e9}"));
        assert_eq!(
            cache.get(tags::PR_SUBJECT.with_type(PropType::UNSPECIFIED)).unwrap(),
            subject("Re: caf\u{e9}")
        );
    }

    #[test]
    fn narrow_write_is_stored_wide() {
        let mut cache = PropertyCache::new();
        let narrow = tags::PR_SUBJECT.with_type(PropType::STRING8);
        cache.set(narrow, &PropertyValue::String8(b"hi".to_vec())).unwrap();
        assert_eq!(cache.entry(narrow).unwrap().tag(), tags::PR_SUBJECT);
        assert_eq!(cache.dirty_props(), vec![Prop::new(tags::PR_SUBJECT, subject("hi"))]);
    }

    #[test]
    fn mismatched_type_is_not_found() {
        let mut cache = PropertyCache::new();
        cache.set(tags::PR_SUBJECT, &subject("x")).unwrap();
        let as_long = tags::PR_SUBJECT.with_type(PropType::LONG);
        assert_eq!(cache.get(as_long), Err(CoreError::not_found(as_long)));
    }

    #[test]
    fn set_rejects_bad_values() {
        let mut cache = PropertyCache::new();
        assert!(matches!(
            cache.set(tags::PR_SUBJECT, &PropertyValue::Long(1)),
            Err(CoreError::InvalidParameter { .. })
        ));
        assert!(matches!(
            cache.set(tags::PR_SUBJECT, &PropertyValue::Error(ErrorCode::NOT_FOUND)),
            Err(CoreError::InvalidParameter { .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn redefining_type_queues_old_tag() {
        let mut cache = PropertyCache::new();
        let as_long = PropTag::new(0x6700, PropType::LONG);
        let as_bin = PropTag::new(0x6700, PropType::BINARY);
        cache.insert_loaded(&Prop::new(as_long, PropertyValue::Long(4))).unwrap();

        cache.set(as_bin, &PropertyValue::Binary(vec![1, 2])).unwrap();
        assert_eq!(cache.deleted_tags(), vec![as_long]);
        assert_eq!(cache.get(as_bin).unwrap(), PropertyValue::Binary(vec![1, 2]));

        cache.set(as_long, &PropertyValue::Long(5)).unwrap();
        assert_eq!(cache.deleted_tags(), vec![as_bin]);
        assert!(!cache.is_deleted(as_long));
    }

    #[test]
    fn delete_moves_tag_to_deleted_set() {
        let mut cache = PropertyCache::new();
        cache.insert_loaded(&Prop::new(tags::PR_SUBJECT, subject("s"))).unwrap();
        cache.delete(tags::PR_SUBJECT).unwrap();
        assert!(cache.entry(tags::PR_SUBJECT).is_none());
        assert_eq!(cache.deleted_tags(), vec![tags::PR_SUBJECT]);
        assert!(cache.is_dirty());
        assert_eq!(
            cache.delete(tags::PR_SUBJECT),
            Err(CoreError::not_found(tags::PR_SUBJECT))
        );

        cache.set(tags::PR_SUBJECT, &subject("back")).unwrap();
        assert!(cache.deleted_tags().is_empty());
    }

    #[test]
    fn mark_clean_resets_bookkeeping() {
        let mut cache = PropertyCache::new();
        cache.set(tags::PR_SUBJECT, &subject("s")).unwrap();
        cache.insert_loaded(&Prop::new(tags::PR_MESSAGE_FLAGS, PropertyValue::Long(1))).unwrap();
        cache.delete(tags::PR_MESSAGE_FLAGS).unwrap();
        cache.mark_clean();
        assert!(!cache.is_dirty());
        assert!(cache.dirty_props().is_empty());
        assert_eq!(cache.state(tags::PR_SUBJECT), Some(EntryState::LoadedClean));
    }

    #[test]
    fn available_never_demotes_loaded() {
        let mut cache = PropertyCache::new();
        cache.insert_loaded(&Prop::new(tags::PR_BODY, subject("text"))).unwrap();
        cache.insert_available(tags::PR_BODY);
        assert_eq!(cache.get(tags::PR_BODY).unwrap(), subject("text"));
    }

    #[test]
    fn announcement_does_not_undo_delete() {
        let mut cache = PropertyCache::new();
        cache.insert_loaded(&Prop::new(tags::PR_BODY, subject("text"))).unwrap();
        cache.delete(tags::PR_BODY).unwrap();
        cache.insert_available(tags::PR_BODY);
        assert!(cache.entry(tags::PR_BODY).is_none());
        assert!(cache.is_deleted(tags::PR_BODY));
    }

    #[test]
    fn oversized_slot_becomes_available() {
        let mut cache = PropertyCache::new();
        cache
            .insert_loaded(&Prop::error(tags::PR_BODY, ErrorCode::NOT_ENOUGH_MEMORY))
            .unwrap();
        cache
            .insert_loaded(&Prop::error(tags::PR_SUBJECT, ErrorCode::NOT_FOUND))
            .unwrap();
        assert_eq!(
            cache.get(tags::PR_BODY),
            Err(CoreError::DemandLoadRequired { tag: tags::PR_BODY })
        );
        assert_eq!(
            cache.get(tags::PR_SUBJECT),
            Err(CoreError::not_found(tags::PR_SUBJECT))
        );
    }

    #[test]
    fn list_tags_merges_computed() {
        let mut cache = PropertyCache::new();
        cache.set(tags::PR_SUBJECT, &subject("s")).unwrap();
        cache.insert_available(tags::PR_BODY);
        let handlers = HandlerTable::with_defaults(mapisync_entryid::ObjectType::Message);
        let listed = cache.list_tags(&handlers);
        assert!(listed.contains(&tags::PR_SUBJECT));
        assert!(listed.contains(&tags::PR_BODY));
        assert!(listed.contains(&tags::PR_ENTRYID));
        assert!(listed.contains(&tags::PR_OBJECT_TYPE));
        let mut sorted = listed.clone();
        sorted.sort_by_key(|t| t.id());
        assert_eq!(listed, sorted);
    }

    #[test]
    fn loaded_size_sums_values() {
        let mut cache = PropertyCache::new();
        cache.set(tags::PR_ENTRYID, &PropertyValue::Binary(vec![0; 10])).unwrap();
        cache.set(tags::PR_MESSAGE_FLAGS, &PropertyValue::Long(1)).unwrap();
        cache.insert_available(tags::PR_BODY);
        assert_eq!(cache.loaded_size(), 14);
        assert_eq!(cache.len(), 3);
    }
}
