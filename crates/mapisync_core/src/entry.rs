//! A single cached property.

use crate::error::CoreResult;
use mapisync_codec::{PropTag, PropertyValue};

/// Logical state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// The server reported the tag; the value was not fetched.
    Available,
    /// Value present and in sync with the server.
    LoadedClean,
    /// Value present with a pending write-back.
    LoadedDirty,
}

/// A cached property: tag, optional value, and dirty flag.
///
/// The entry exclusively owns its value. Writes reuse the existing
/// allocation when the stored kind matches, so storage only grows.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    tag: PropTag,
    value: Option<PropertyValue>,
    dirty: bool,
    high_water: usize,
}

impl PropertyEntry {
    /// Creates an entry for a tag whose value was not fetched.
    pub fn available(tag: PropTag) -> Self {
        Self {
            tag,
            value: None,
            dirty: false,
            high_water: 0,
        }
    }

    /// Creates a clean entry holding `value`.
    pub fn loaded(tag: PropTag, value: PropertyValue) -> Self {
        let value = value.into_stored();
        let high_water = value.size();
        Self {
            tag,
            value: Some(value),
            dirty: false,
            high_water,
        }
    }

    /// Returns the stored tag.
    pub fn tag(&self) -> PropTag {
        self.tag
    }

    /// Returns the value, if loaded.
    pub fn value(&self) -> Option<&PropertyValue> {
        self.value.as_ref()
    }

    /// Returns true if the value has a pending write-back.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns true if the value is present.
    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }

    /// Returns the largest value size this entry has held.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Returns the entry's logical state.
    pub fn state(&self) -> EntryState {
        match (&self.value, self.dirty) {
            (None, _) => EntryState::Available,
            (Some(_), false) => EntryState::LoadedClean,
            (Some(_), true) => EntryState::LoadedDirty,
        }
    }

    /// Writes `value` and marks the entry dirty.
    pub fn set(&mut self, value: &PropertyValue) -> CoreResult<()> {
        self.store(value)?;
        self.dirty = true;
        Ok(())
    }

    /// Writes a server-supplied `value` and marks the entry clean.
    pub fn load(&mut self, value: &PropertyValue) -> CoreResult<()> {
        self.store(value)?;
        self.dirty = false;
        Ok(())
    }

    fn store(&mut self, value: &PropertyValue) -> CoreResult<()> {
        match &mut self.value {
            Some(existing) => existing.copy_from(value)?,
            None => self.value = Some(value.clone().into_stored()),
        }
        if let Some(stored) = &self.value {
            self.high_water = self.high_water.max(stored.size());
        }
        Ok(())
    }

    /// Clears the dirty flag.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
