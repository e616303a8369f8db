//! Object types and well-known provider GUIDs.

use std::fmt;
use uuid::Uuid;

/// Provider GUID carried by every address-book entry id issued by the server.
pub const AB_PROVIDER_GUID: Uuid = Uuid::from_bytes([
    0xac, 0x21, 0xa9, 0x50, 0x40, 0xd3, 0xee, 0x48, 0xb3, 0x19, 0xfb, 0xa7, 0x53, 0x30, 0x44, 0x25,
]);

/// Provider GUID of the store-wrapping entry id used by redirect providers.
pub const WRAPPED_STORE_GUID: Uuid = Uuid::from_bytes([
    0x38, 0xa1, 0xbb, 0x10, 0x05, 0xe5, 0x10, 0x1a, 0xa1, 0xbb, 0x08, 0x00, 0x2b, 0x2a, 0x56, 0xc2,
]);

/// Type of the object an entry id points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum ObjectType {
    /// Message store.
    Store = 1,
    /// Address book root.
    AddressBook = 2,
    /// Folder.
    Folder = 3,
    /// Address-book container.
    AbContainer = 4,
    /// Message.
    Message = 5,
    /// Mail user (address-book entry).
    MailUser = 6,
    /// Attachment.
    Attachment = 7,
    /// Distribution list.
    DistList = 8,
}

impl ObjectType {
    /// Converts a numeric code to an object type.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Store),
            2 => Some(Self::AddressBook),
            3 => Some(Self::Folder),
            4 => Some(Self::AbContainer),
            5 => Some(Self::Message),
            6 => Some(Self::MailUser),
            7 => Some(Self::Attachment),
            8 => Some(Self::DistList),
            _ => None,
        }
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Returns true if objects of this type expose contents or hierarchy tables.
    pub fn hosts_tables(self) -> bool {
        matches!(
            self,
            Self::Store | Self::Folder | Self::Message | Self::AbContainer | Self::DistList
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Store => "store",
            Self::AddressBook => "addressbook",
            Self::Folder => "folder",
            Self::AbContainer => "abcontainer",
            Self::Message => "message",
            Self::MailUser => "mailuser",
            Self::Attachment => "attachment",
            Self::DistList => "distlist",
        };
        f.write_str(name)
    }
}
