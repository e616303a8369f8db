//! Capability traits an object exposes.
//!
//! Callers ask an [`ObjectState`] for the capability they need instead of
//! probing interfaces. Capabilities an object lacks come back as `None`.

use crate::error::CoreResult;
use crate::object::ObjectState;
use crate::types::SingleInstanceRef;
use mapisync_codec::{Prop, PropTag, PropertyValue};
use mapisync_entryid::ObjectType;
use std::fmt;

/// Read access to properties.
pub trait PropReadable {
    /// Reads one property.
    fn get_prop(&self, tag: PropTag) -> CoreResult<PropertyValue>;

    /// Lists the tags the object exposes.
    fn list_tags(&self) -> Vec<PropTag>;
}

/// Write access to properties.
pub trait PropWritable: PropReadable {
    /// Writes one property.
    fn set_prop(&mut self, prop: &Prop) -> CoreResult<()>;

    /// Deletes one property.
    fn delete_prop(&mut self, tag: PropTag) -> CoreResult<()>;
}

/// Access to the single-instance reference of a large value.
pub trait SingleInstance {
    /// Returns the current reference.
    fn instance(&self) -> Option<&SingleInstanceRef>;

    /// Points the object at an existing payload.
    fn set_instance(&mut self, instance: SingleInstanceRef) -> CoreResult<()>;
}

/// Objects that expose server-side tables.
pub trait TableHost {
    /// Tables the object can open.
    fn tables(&self) -> &'static [TableKind];

    /// Returns true if `kind` can be opened on this object.
    fn hosts(&self, kind: TableKind) -> bool {
        self.tables().contains(&kind)
    }
}

/// Kind of table an object hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Messages of a folder, or entries of a container.
    Contents,
    /// Associated (hidden) messages of a folder.
    AssociatedContents,
    /// Subfolders or subcontainers.
    Hierarchy,
    /// Attachments of a message.
    Attachments,
    /// Recipients of a message.
    Recipients,
}

impl TableKind {
    /// Returns the numeric code.
    pub fn code(self) -> u32 {
        match self {
            Self::Contents => 1,
            Self::AssociatedContents => 2,
            Self::Hierarchy => 3,
            Self::Attachments => 4,
            Self::Recipients => 5,
        }
    }

    /// Converts a numeric code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Contents),
            2 => Some(Self::AssociatedContents),
            3 => Some(Self::Hierarchy),
            4 => Some(Self::Attachments),
            5 => Some(Self::Recipients),
            _ => None,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Contents => "contents",
            Self::AssociatedContents => "associated-contents",
            Self::Hierarchy => "hierarchy",
            Self::Attachments => "attachments",
            Self::Recipients => "recipients",
        };
        f.write_str(name)
    }
}

fn tables_of(object_type: ObjectType) -> &'static [TableKind] {
    match object_type {
        ObjectType::Store => &[TableKind::Hierarchy],
        ObjectType::Folder => &[
            TableKind::Contents,
            TableKind::AssociatedContents,
            TableKind::Hierarchy,
        ],
        ObjectType::Message => &[TableKind::Attachments, TableKind::Recipients],
        ObjectType::AbContainer => &[TableKind::Contents, TableKind::Hierarchy],
        ObjectType::DistList => &[TableKind::Contents],
        ObjectType::AddressBook | ObjectType::MailUser | ObjectType::Attachment => &[],
    }
}

impl PropReadable for ObjectState {
    fn get_prop(&self, tag: PropTag) -> CoreResult<PropertyValue> {
        ObjectState::get_prop(self, tag)
    }

    fn list_tags(&self) -> Vec<PropTag> {
        ObjectState::list_tags(self)
    }
}

impl PropWritable for ObjectState {
    fn set_prop(&mut self, prop: &Prop) -> CoreResult<()> {
        ObjectState::set_prop(self, prop)
    }

    fn delete_prop(&mut self, tag: PropTag) -> CoreResult<()> {
        ObjectState::delete_prop(self, tag)
    }
}

impl SingleInstance for ObjectState {
    fn instance(&self) -> Option<&SingleInstanceRef> {
        ObjectState::instance(self)
    }

    fn set_instance(&mut self, instance: SingleInstanceRef) -> CoreResult<()> {
        ObjectState::set_instance(self, instance)
    }
}

impl TableHost for ObjectState {
    fn tables(&self) -> &'static [TableKind] {
        tables_of(self.object_type())
    }
}

impl ObjectState {
    /// Read capability; every object has it.
    pub fn as_readable(&self) -> &dyn PropReadable {
        self
    }

    /// Write capability.
    pub fn as_writable(&mut self) -> &mut dyn PropWritable {
        self
    }

    /// Single-instance capability, held by attachments only.
    pub fn as_single_instance(&mut self) -> Option<&mut dyn SingleInstance> {
        if self.object_type() == ObjectType::Attachment {
            Some(self)
        } else {
            None
        }
    }

    /// Table capability, held by objects that host tables.
    pub fn as_table_host(&self) -> Option<&dyn TableHost> {
        if self.object_type().hosts_tables() {
            Some(self)
        } else {
            None
        }
    }
}
