//! Named properties and the local id table.
//!
//! Well-known numeric names in a handful of property sets map to fixed ids
//! without a server round trip. Everything else is resolved by the server,
//! which hands out ids from [`SERVER_NAMED_BASE`] upward.

use mapisync_codec::tags::NAMED_PROP_BASE;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// `PS_MAPI`: numeric names are plain property ids.
pub const PS_MAPI: Uuid = Uuid::from_u128(0x0002_0328_0000_0000_C000_0000_0000_0046);
/// `PS_PUBLIC_STRINGS`.
pub const PS_PUBLIC_STRINGS: Uuid = Uuid::from_u128(0x0002_0329_0000_0000_C000_0000_0000_0046);
/// Appointment property set.
pub const PSETID_APPOINTMENT: Uuid = Uuid::from_u128(0x0006_2002_0000_0000_C000_0000_0000_0046);
/// Task property set.
pub const PSETID_TASK: Uuid = Uuid::from_u128(0x0006_2003_0000_0000_C000_0000_0000_0046);
/// Contact property set.
pub const PSETID_ADDRESS: Uuid = Uuid::from_u128(0x0006_2004_0000_0000_C000_0000_0000_0046);
/// Common property set.
pub const PSETID_COMMON: Uuid = Uuid::from_u128(0x0006_2008_0000_0000_C000_0000_0000_0046);
/// Journal property set.
pub const PSETID_LOG: Uuid = Uuid::from_u128(0x0006_200A_0000_0000_C000_0000_0000_0046);
/// Meeting property set.
pub const PSETID_MEETING: Uuid = Uuid::from_u128(0x6ED8_DA90_450B_101B_98DA_00AA_003F_1305);

/// First id the server assigns to a named property.
pub const SERVER_NAMED_BASE: u16 = 0x8500;

/// Kind of a property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NameKind {
    /// Numeric name.
    Id(u32),
    /// String name.
    Name(String),
}

/// A property name: property set GUID plus numeric or string name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyName {
    /// Property set.
    pub guid: Uuid,
    /// Name within the set.
    pub kind: NameKind,
}

impl PropertyName {
    /// Creates a numeric name.
    pub fn id(guid: Uuid, id: u32) -> Self {
        Self {
            guid,
            kind: NameKind::Id(id),
        }
    }

    /// Creates a string name.
    pub fn name(guid: Uuid, name: impl Into<String>) -> Self {
        Self {
            guid,
            kind: NameKind::Name(name.into()),
        }
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NameKind::Id(id) => write!(f, "{}:0x{id:04X}", self.guid),
            NameKind::Name(name) => write!(f, "{}:{name}", self.guid),
        }
    }
}

/// A run of numeric names mapped onto consecutive local ids.
#[derive(Debug, Clone, Copy)]
struct LocalRange {
    guid: Uuid,
    first: u32,
    last: u32,
    mapped: u16,
}

impl LocalRange {
    fn local_id(&self, id: u32) -> Option<u16> {
        if (self.first..=self.last).contains(&id) {
            u16::try_from(id - self.first)
                .ok()
                .map(|offset| self.mapped + offset)
        } else {
            None
        }
    }

    fn name_for(&self, local: u16) -> Option<PropertyName> {
        let span = self.last - self.first;
        let offset = u32::from(local.checked_sub(self.mapped)?);
        (offset <= span).then(|| PropertyName::id(self.guid, self.first + offset))
    }
}

const LOCAL_RANGES: [LocalRange; 6] = [
    LocalRange {
        guid: PSETID_MEETING,
        first: 0x0000,
        last: 0x003F,
        mapped: 0x8000,
    },
    LocalRange {
        guid: PSETID_APPOINTMENT,
        first: 0x8200,
        last: 0x827F,
        mapped: 0x8040,
    },
    LocalRange {
        guid: PSETID_TASK,
        first: 0x8100,
        last: 0x813F,
        mapped: 0x80C0,
    },
    LocalRange {
        guid: PSETID_ADDRESS,
        first: 0x8000,
        last: 0x80FF,
        mapped: 0x8100,
    },
    LocalRange {
        guid: PSETID_COMMON,
        first: 0x8500,
        last: 0x85FF,
        mapped: 0x8200,
    },
    LocalRange {
        guid: PSETID_LOG,
        first: 0x8700,
        last: 0x873F,
        mapped: 0x8300,
    },
];

static RANGES_BY_GUID: Lazy<HashMap<Uuid, Vec<LocalRange>>> = Lazy::new(|| {
    let mut map: HashMap<Uuid, Vec<LocalRange>> = HashMap::new();
    for range in LOCAL_RANGES {
        map.entry(range.guid).or_default().push(range);
    }
    map
});

/// Resolves a name without the server, if it is well known.
///
/// Numeric `PS_MAPI` names below the named range are plain property ids.
pub fn local_id_for(name: &PropertyName) -> Option<u16> {
    let NameKind::Id(id) = name.kind else {
        return None;
    };
    if name.guid == PS_MAPI {
        return u16::try_from(id).ok().filter(|id| *id < NAMED_PROP_BASE);
    }
    RANGES_BY_GUID
        .get(&name.guid)?
        .iter()
        .find_map(|range| range.local_id(id))
}

/// Reverse of [`local_id_for`] for ids inside the local table.
pub fn local_name_for(id: u16) -> Option<PropertyName> {
    if id < NAMED_PROP_BASE {
        return Some(PropertyName::id(PS_MAPI, u32::from(id)));
    }
    LOCAL_RANGES.iter().find_map(|range| range.name_for(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapi_ids_pass_through() {
        assert_eq!(local_id_for(&PropertyName::id(PS_MAPI, 0x0037)), Some(0x0037));
        assert_eq!(local_id_for(&PropertyName::id(PS_MAPI, 0x8001)), None);
        assert_eq!(local_id_for(&PropertyName::id(PS_MAPI, 0x1_0000)), None);
    }

    #[test]
    fn well_known_ranges_map_locally() {
        assert_eq!(
            local_id_for(&PropertyName::id(PSETID_APPOINTMENT, 0x8205)),
            Some(0x8045)
        );
        assert_eq!(
            local_id_for(&PropertyName::id(PSETID_COMMON, 0x8503)),
            Some(0x8203)
        );
        assert_eq!(local_id_for(&PropertyName::id(PSETID_COMMON, 0x8600)), None);
        assert_eq!(
            local_id_for(&PropertyName::name(PS_PUBLIC_STRINGS, "Keywords")),
            None
        );
    }

    #[test]
    fn local_table_is_reversible() {
        for range in LOCAL_RANGES {
            let name = PropertyName::id(range.guid, range.last);
            let id = local_id_for(&name).unwrap();
            assert_eq!(local_name_for(id), Some(name));
        }
        assert_eq!(local_name_for(SERVER_NAMED_BASE), None);
    }

    #[test]
    fn ranges_do_not_overlap() {
        let mut ids: Vec<u16> = LOCAL_RANGES
            .iter()
            .flat_map(|r| (r.first..=r.last).filter_map(move |id| r.local_id(id)))
            .collect();
        let count = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), count);
        assert!(ids.iter().all(|id| *id >= NAMED_PROP_BASE && *id < SERVER_NAMED_BASE));
    }
}
