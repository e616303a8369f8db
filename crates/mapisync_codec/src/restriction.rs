//! Restriction trees and rule actions.
//!
//! Both appear as property values (`SRESTRICTION`, `ACTIONS`) and as table
//! operations. They own all nested values; cloning is a deep copy.

use crate::tag::PropTag;
use crate::value::Prop;
use std::mem::size_of;
use uuid::Uuid;

/// Relational operator used by property, size and compare restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelOp {
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Regular expression match.
    Re,
}

impl RelOp {
    /// Returns the wire code.
    pub fn to_code(self) -> u32 {
        match self {
            Self::Lt => 0,
            Self::Le => 1,
            Self::Gt => 2,
            Self::Ge => 3,
            Self::Eq => 4,
            Self::Ne => 5,
            Self::Re => 6,
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Lt),
            1 => Some(Self::Le),
            2 => Some(Self::Gt),
            3 => Some(Self::Ge),
            4 => Some(Self::Eq),
            5 => Some(Self::Ne),
            6 => Some(Self::Re),
            _ => None,
        }
    }
}

/// Bitmask test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitMaskOp {
    /// `value & mask == 0`.
    EqualZero,
    /// `value & mask != 0`.
    NotEqualZero,
}

/// Fuzzy level of a content restriction: match mode in the low word, flags in
/// the high word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuzzyLevel(pub u32);

impl FuzzyLevel {
    /// Whole-string match.
    pub const FULLSTRING: Self = Self(0x0000_0000);
    /// Substring match.
    pub const SUBSTRING: Self = Self(0x0000_0001);
    /// Prefix match.
    pub const PREFIX: Self = Self(0x0000_0002);
    /// Case-insensitive flag.
    pub const IGNORECASE: u32 = 0x0001_0000;

    /// Returns this level with the ignore-case flag set.
    #[must_use]
    pub const fn ignore_case(self) -> Self {
        Self(self.0 | Self::IGNORECASE)
    }
}

/// A restriction tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    /// All children must match.
    And(Vec<Restriction>),
    /// Any child must match.
    Or(Vec<Restriction>),
    /// The child must not match.
    Not(Box<Restriction>),
    /// Text or binary content match.
    Content {
        /// Match mode and flags.
        fuzzy: FuzzyLevel,
        /// Property to test.
        tag: PropTag,
        /// Value to look for.
        value: Prop,
    },
    /// Compare a property against a constant.
    Property {
        /// Operator.
        relop: RelOp,
        /// Property to test.
        tag: PropTag,
        /// Constant operand.
        value: Prop,
    },
    /// Compare two properties of the same row.
    CompareProps {
        /// Operator.
        relop: RelOp,
        /// Left property.
        left: PropTag,
        /// Right property.
        right: PropTag,
    },
    /// Bitmask test.
    BitMask {
        /// Test kind.
        op: BitMaskOp,
        /// Property to test.
        tag: PropTag,
        /// Mask.
        mask: u32,
    },
    /// Compare the size of a property.
    Size {
        /// Operator.
        relop: RelOp,
        /// Property to test.
        tag: PropTag,
        /// Size operand in bytes.
        size: u32,
    },
    /// The property exists.
    Exist {
        /// Property to test.
        tag: PropTag,
    },
    /// Apply a restriction to a sub-object table (recipients, attachments).
    SubRestriction {
        /// Sub-object selector.
        subobject: PropTag,
        /// Restriction applied to the sub-object rows.
        restriction: Box<Restriction>,
    },
    /// Annotation carrying extra properties around an optional restriction.
    Comment {
        /// Annotation properties.
        props: Vec<Prop>,
        /// Wrapped restriction.
        restriction: Option<Box<Restriction>>,
    },
}

impl Restriction {
    /// Logical size in bytes, including nested values.
    pub fn size(&self) -> usize {
        let own = size_of::<u32>();
        match self {
            Self::And(children) | Self::Or(children) => {
                own + children.iter().map(Restriction::size).sum::<usize>()
            }
            Self::Not(child) => own + child.size(),
            Self::Content { value, .. } | Self::Property { value, .. } => {
                own * 3 + value.value.size()
            }
            Self::CompareProps { .. } | Self::BitMask { .. } | Self::Size { .. } => own * 4,
            Self::Exist { .. } => own * 2,
            Self::SubRestriction { restriction, .. } => own * 2 + restriction.size(),
            Self::Comment { props, restriction } => {
                own + props.iter().map(|p| own + p.value.size()).sum::<usize>()
                    + restriction.as_ref().map_or(0, |r| r.size())
            }
        }
    }

    /// Nesting depth; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            Self::And(children) | Self::Or(children) => {
                1 + children.iter().map(Restriction::depth).max().unwrap_or(0)
            }
            Self::Not(child) => 1 + child.depth(),
            Self::SubRestriction { restriction, .. } => 1 + restriction.depth(),
            Self::Comment { restriction, .. } => 1 + restriction.as_ref().map_or(0, |r| r.depth()),
            _ => 1,
        }
    }
}

/// A row of properties, used for recipient lists in forward/delegate actions.
pub type PropRow = Vec<Prop>;

/// What a rule action does.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Move the message to a folder.
    Move {
        /// Target store.
        store_entry_id: Vec<u8>,
        /// Target folder.
        folder_entry_id: Vec<u8>,
    },
    /// Copy the message to a folder.
    Copy {
        /// Target store.
        store_entry_id: Vec<u8>,
        /// Target folder.
        folder_entry_id: Vec<u8>,
    },
    /// Reply with a template message.
    Reply {
        /// Template message.
        entry_id: Vec<u8>,
        /// Template GUID.
        template: Uuid,
    },
    /// Out-of-office reply with a template message.
    OofReply {
        /// Template message.
        entry_id: Vec<u8>,
        /// Template GUID.
        template: Uuid,
    },
    /// Defer to the client with opaque data.
    Defer {
        /// Client data.
        data: Vec<u8>,
    },
    /// Bounce with a code.
    Bounce {
        /// Bounce code.
        code: u32,
    },
    /// Forward to recipients.
    Forward {
        /// Recipient rows.
        recipients: Vec<PropRow>,
    },
    /// Delegate to recipients.
    Delegate {
        /// Recipient rows.
        recipients: Vec<PropRow>,
    },
    /// Set a property on the message.
    Tag {
        /// Property to set.
        prop: Prop,
    },
    /// Delete the message.
    Delete,
    /// Mark the message as read.
    MarkAsRead,
}

impl ActionKind {
    /// Returns the wire code of this action type.
    pub fn to_code(&self) -> u32 {
        match self {
            Self::Move { .. } => 1,
            Self::Copy { .. } => 2,
            Self::Reply { .. } => 3,
            Self::OofReply { .. } => 4,
            Self::Defer { .. } => 5,
            Self::Bounce { .. } => 6,
            Self::Forward { .. } => 7,
            Self::Delegate { .. } => 8,
            Self::Tag { .. } => 9,
            Self::Delete => 10,
            Self::MarkAsRead => 11,
        }
    }
}

/// One rule action.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// What to do.
    pub kind: ActionKind,
    /// Action flavor flags.
    pub flavor: u32,
    /// Rule flags.
    pub flags: u32,
}

impl Action {
    /// Creates an action with zero flavor and flags.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            flavor: 0,
            flags: 0,
        }
    }

    /// Logical size in bytes, including nested values.
    pub fn size(&self) -> usize {
        let own = size_of::<u32>() * 3;
        let rows = |rows: &[PropRow]| -> usize {
            rows.iter()
                .flat_map(|row| row.iter())
                .map(|p| size_of::<u32>() + p.value.size())
                .sum()
        };
        own + match &self.kind {
            ActionKind::Move {
                store_entry_id,
                folder_entry_id,
            }
            | ActionKind::Copy {
                store_entry_id,
                folder_entry_id,
            } => store_entry_id.len() + folder_entry_id.len(),
            ActionKind::Reply { entry_id, .. } | ActionKind::OofReply { entry_id, .. } => {
                entry_id.len() + 16
            }
            ActionKind::Defer { data } => data.len(),
            ActionKind::Bounce { .. } => size_of::<u32>(),
            ActionKind::Forward { recipients } | ActionKind::Delegate { recipients } => {
                rows(recipients)
            }
            ActionKind::Tag { prop } => size_of::<u32>() + prop.value.size(),
            ActionKind::Delete | ActionKind::MarkAsRead => 0,
        }
    }
}
