//! Named-property resolution messages.

use mapisync_core::{NameKind, PropertyName};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A property name on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireName {
    /// Property set GUID bytes.
    pub guid: [u8; 16],
    /// Numeric or string name.
    pub kind: WireNameKind,
}

/// Name half of a [`WireName`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireNameKind {
    /// Numeric name.
    Id(u32),
    /// String name.
    Name(String),
}

impl From<&PropertyName> for WireName {
    fn from(name: &PropertyName) -> Self {
        Self {
            guid: *name.guid.as_bytes(),
            kind: match &name.kind {
                NameKind::Id(id) => WireNameKind::Id(*id),
                NameKind::Name(text) => WireNameKind::Name(text.clone()),
            },
        }
    }
}

impl From<&WireName> for PropertyName {
    fn from(name: &WireName) -> Self {
        let guid = Uuid::from_bytes(name.guid);
        match &name.kind {
            WireNameKind::Id(id) => PropertyName::id(guid, *id),
            WireNameKind::Name(text) => PropertyName::name(guid, text.clone()),
        }
    }
}

/// Asks the server for the ids of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetIdsFromNamesRequest {
    /// Names to resolve.
    pub names: Vec<WireName>,
    /// Assign ids to unknown names.
    pub create: bool,
}

/// Ids in request order; zero marks a name the server does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetIdsFromNamesResponse {
    /// Resolved ids.
    pub ids: Vec<u16>,
}

/// Asks the server for the names behind ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetNamesFromIdsRequest {
    /// Ids to look up.
    pub ids: Vec<u16>,
}

/// Names in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetNamesFromIdsResponse {
    /// Names; `None` where the id is unknown.
    pub names: Vec<Option<WireName>>,
}
