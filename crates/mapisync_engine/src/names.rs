//! Named-property resolution.
//!
//! Well-known names resolve through the static local table. Everything else
//! is asked of the server once and memoised for the session.

use mapisync_core::{local_id_for, local_name_for, PropertyName};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Memo of names the server resolved.
#[derive(Debug, Default)]
pub struct NamedPropResolver {
    by_name: RwLock<HashMap<PropertyName, u16>>,
    by_id: RwLock<HashMap<u16, PropertyName>>,
}

impl NamedPropResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a name without a round trip.
    pub fn lookup(&self, name: &PropertyName) -> Option<u16> {
        local_id_for(name).or_else(|| self.by_name.read().get(name).copied())
    }

    /// Resolves an id without a round trip.
    pub fn name_of(&self, id: u16) -> Option<PropertyName> {
        local_name_for(id).or_else(|| self.by_id.read().get(&id).cloned())
    }

    /// Records a mapping the server returned. Zero ids are not kept.
    pub fn remember(&self, name: PropertyName, id: u16) {
        if id == 0 {
            return;
        }
        self.by_id.write().insert(id, name.clone());
        self.by_name.write().insert(name, id);
    }

    /// Number of memoised server mappings.
    pub fn len(&self) -> usize {
        self.by_name.read().len()
    }

    /// Returns true if nothing has been memoised.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every server mapping.
    pub fn clear(&self) {
        self.by_name.write().clear();
        self.by_id.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapisync_core::{PSETID_COMMON, PS_PUBLIC_STRINGS};

    #[test]
    fn local_table_wins() {
        let resolver = NamedPropResolver::new();
        assert_eq!(
            resolver.lookup(&PropertyName::id(PSETID_COMMON, 0x8503)),
            Some(0x8203)
        );
        assert!(resolver.is_empty());
    }

    #[test]
    fn remembers_server_answers() {
        let resolver = NamedPropResolver::new();
        let name = PropertyName::name(PS_PUBLIC_STRINGS, "Keywords");
        assert_eq!(resolver.lookup(&name), None);

        resolver.remember(name.clone(), 0x8512);
        assert_eq!(resolver.lookup(&name), Some(0x8512));
        assert_eq!(resolver.name_of(0x8512), Some(name));

        resolver.remember(PropertyName::name(PS_PUBLIC_STRINGS, "Unknown"), 0);
        assert_eq!(resolver.len(), 1);

        resolver.clear();
        assert!(resolver.is_empty());
    }
}
