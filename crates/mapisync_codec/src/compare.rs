//! Locale-aware property comparison.

use crate::error::CodecResult;
use crate::frame::to_cbor;
use crate::restriction::{Action, Restriction};
use crate::tag::tags;
use crate::text::narrow_to_wide;
use crate::value::{Prop, PropertyValue};
use crate::wire::{action_to_wire, restriction_to_wire};
use mapisync_entryid::{AbEntryId, AB_PROVIDER_GUID};
use std::cmp::Ordering;
use std::fmt;

/// Collation locale for text comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Locale {
    name: String,
}

impl Locale {
    /// Creates a locale from a POSIX-style name such as `tr_TR.UTF-8`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The invariant locale.
    pub fn invariant() -> Self {
        Self::default()
    }

    /// Returns the locale name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Turkish and Azeri fold dotted and dotless i separately.
    fn dotted_i(&self) -> bool {
        let lang = self.name.split(['_', '-', '.']).next().unwrap_or("");
        lang.eq_ignore_ascii_case("tr") || lang.eq_ignore_ascii_case("az")
    }

    fn fold(&self, c: char) -> impl Iterator<Item = char> {
        let special = if self.dotted_i() {
            match c {
                'I' => Some('\u{0131}'),
                '\u{0130}' => Some('i'),
                _ => None,
            }
        } else {
            None
        };
        let lower = match special {
            Some(_) => None,
            None => Some(c.to_lowercase()),
        };
        special.into_iter().chain(lower.into_iter().flatten())
    }

    /// Compares two strings case-insensitively.
    pub fn compare_text(&self, a: &str, b: &str) -> Ordering {
        let left = a.chars().flat_map(|c| self.fold(c));
        let right = b.chars().flat_map(|c| self.fold(c));
        left.cmp(right)
    }

    /// Returns true if `text` starts with `prefix`, case-insensitively.
    pub fn starts_with(&self, text: &str, prefix: &str) -> bool {
        let mut left = text.chars().flat_map(|c| self.fold(c));
        prefix
            .chars()
            .flat_map(|c| self.fold(c))
            .all(|p| left.next() == Some(p))
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str("invariant")
        } else {
            f.write_str(&self.name)
        }
    }
}

fn float_cmp(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

/// Binary comparison: address-book ids by identity, everything else by
/// length then bytes.
fn binary_cmp(a: &[u8], b: &[u8]) -> Ordering {
    if let (Ok(x), Ok(y)) = (AbEntryId::decode(a), AbEntryId::decode(b)) {
        if x.guid() == AB_PROVIDER_GUID && y.guid() == AB_PROVIDER_GUID {
            return x.compare(&y);
        }
    }
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn slice_cmp<T>(a: &[T], b: &[T], cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| {
        a.iter()
            .zip(b)
            .map(|(x, y)| cmp(x, y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}

fn text_of(value: &PropertyValue) -> Option<std::borrow::Cow<'_, str>> {
    match value {
        PropertyValue::Unicode(s) => Some(s.as_str().into()),
        PropertyValue::String8(b) => Some(narrow_to_wide(b).into()),
        _ => None,
    }
}

/// Restrictions and actions have no natural order: equal trees compare
/// `Equal`, others by size and then by their encoded wire form. A tree that
/// cannot be encoded sorts after one that can.
fn structural_cmp<T: PartialEq>(
    a: &T,
    b: &T,
    size: impl Fn(&T) -> usize,
    encode: impl Fn(&T) -> CodecResult<Vec<u8>>,
) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    size(a)
        .cmp(&size(b))
        .then_with(|| match (encode(a), encode(b)) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => Ordering::Equal,
        })
}

fn encoded_restriction(r: &Restriction) -> CodecResult<Vec<u8>> {
    to_cbor(&restriction_to_wire(r)?)
}

fn encoded_actions(actions: &[Action]) -> CodecResult<Vec<u8>> {
    let wire = actions
        .iter()
        .map(action_to_wire)
        .collect::<CodecResult<Vec<_>>>()?;
    to_cbor(&wire)
}

impl PropertyValue {
    /// Compares two values.
    ///
    /// Text compares case-insensitively under `locale`, binary by length then
    /// bytes (address-book ids by identity), numbers numerically. Values of
    /// different types order by type code.
    pub fn compare(&self, other: &PropertyValue, locale: &Locale) -> Ordering {
        use PropertyValue as V;

        if let (Some(a), Some(b)) = (text_of(self), text_of(other)) {
            return locale.compare_text(&a, &b);
        }

        match (self, other) {
            (V::Null, V::Null) => Ordering::Equal,
            (V::I2(a), V::I2(b)) => a.cmp(b),
            (V::Long(a), V::Long(b)) => a.cmp(b),
            (V::I8(a), V::I8(b)) => a.cmp(b),
            (V::R4(a), V::R4(b)) => float_cmp(f64::from(*a), f64::from(*b)),
            (V::Double(a), V::Double(b)) | (V::AppTime(a), V::AppTime(b)) => float_cmp(*a, *b),
            (V::Currency(a), V::Currency(b)) | (V::SysTime(a), V::SysTime(b)) => {
                a.as_i64().cmp(&b.as_i64())
            }
            (V::Boolean(a), V::Boolean(b)) => a.cmp(b),
            (V::Error(a), V::Error(b)) => a.cmp(b),
            (V::Clsid(a), V::Clsid(b)) => a.as_bytes().cmp(b.as_bytes()),
            (V::Binary(a), V::Binary(b)) => binary_cmp(a, b),
            (V::MvI2(a), V::MvI2(b)) => slice_cmp(a, b, Ord::cmp),
            (V::MvLong(a), V::MvLong(b)) => slice_cmp(a, b, Ord::cmp),
            (V::MvI8(a), V::MvI8(b)) => slice_cmp(a, b, Ord::cmp),
            (V::MvR4(a), V::MvR4(b)) => {
                slice_cmp(a, b, |x, y| float_cmp(f64::from(*x), f64::from(*y)))
            }
            (V::MvDouble(a), V::MvDouble(b)) | (V::MvAppTime(a), V::MvAppTime(b)) => {
                slice_cmp(a, b, |x, y| float_cmp(*x, *y))
            }
            (V::MvCurrency(a), V::MvCurrency(b)) | (V::MvSysTime(a), V::MvSysTime(b)) => {
                slice_cmp(a, b, |x, y| x.as_i64().cmp(&y.as_i64()))
            }
            (V::MvClsid(a), V::MvClsid(b)) => slice_cmp(a, b, |x, y| x.as_bytes().cmp(y.as_bytes())),
            (V::MvBinary(a), V::MvBinary(b)) => slice_cmp(a, b, |x, y| binary_cmp(x, y)),
            (V::MvUnicode(a), V::MvUnicode(b)) => {
                slice_cmp(a, b, |x, y| locale.compare_text(x, y))
            }
            (V::MvString8(a), V::MvString8(b)) => slice_cmp(a, b, |x, y| {
                locale.compare_text(&narrow_to_wide(x), &narrow_to_wide(y))
            }),
            (V::Restriction(a), V::Restriction(b)) => {
                structural_cmp(a.as_ref(), b.as_ref(), Restriction::size, encoded_restriction)
            }
            (V::Actions(a), V::Actions(b)) => structural_cmp(
                a,
                b,
                |v| v.iter().map(|x| x.size()).sum(),
                |v| encoded_actions(v),
            ),
            (a, b) => a.prop_type().0.cmp(&b.prop_type().0),
        }
    }
}

impl Prop {
    /// Compares two properties.
    ///
    /// The ambiguous-name-resolution key uses prefix matching: it compares
    /// `Equal` whenever the left text starts with the right text.
    pub fn compare(&self, other: &Prop, locale: &Locale) -> Ordering {
        if self.tag.id() == tags::PR_ANR.id() {
            if let (Some(a), Some(b)) = (text_of(&self.value), text_of(&other.value)) {
                if locale.starts_with(&a, &b) {
                    return Ordering::Equal;
                }
                return locale.compare_text(&a, &b);
            }
        }
        self.value.compare(&other.value, locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapisync_entryid::ObjectType;
    use uuid::Uuid;

    fn text(s: &str) -> PropertyValue {
        PropertyValue::Unicode(s.into())
    }

    #[test]
    fn text_is_case_insensitive() {
        let loc = Locale::invariant();
        assert_eq!(text("Hello").compare(&text("hELLO"), &loc), Ordering::Equal);
        assert_eq!(text("a").compare(&text("B"), &loc), Ordering::Less);
    }

    #[test]
    fn narrow_and_wide_text_compare() {
        let loc = Locale::invariant();
        let narrow = PropertyValue::String8(b"ABC".to_vec());
        assert_eq!(narrow.compare(&text("abc"), &loc), Ordering::Equal);
    }

    #[test]
    fn turkish_dotless_i() {
        let tr = Locale::new("tr_TR.UTF-8");
        let inv = Locale::invariant();
        assert_eq!(text("I").compare(&text("i"), &inv), Ordering::Equal);
        assert_ne!(text("I").compare(&text("i"), &tr), Ordering::Equal);
        assert_eq!(text("I").compare(&text("\u{0131}"), &tr), Ordering::Equal);
        assert_eq!(text("\u{0130}").compare(&text("i"), &tr), Ordering::Equal);
    }

    #[test]
    fn anr_uses_prefix_match() {
        let loc = Locale::invariant();
        let left = Prop::new(tags::PR_ANR, text("Johnson, Bob"));
        let right = Prop::new(tags::PR_ANR, text("john"));
        assert_eq!(left.compare(&right, &loc), Ordering::Equal);

        let subject = Prop::new(tags::PR_SUBJECT, text("Johnson, Bob"));
        let subject2 = Prop::new(tags::PR_SUBJECT, text("john"));
        assert_ne!(subject.compare(&subject2, &loc), Ordering::Equal);
    }

    #[test]
    fn binary_is_length_first() {
        let loc = Locale::invariant();
        let short = PropertyValue::Binary(vec![0xFF]);
        let long = PropertyValue::Binary(vec![0x00, 0x00]);
        assert_eq!(short.compare(&long, &loc), Ordering::Less);
        assert_eq!(short.compare(&short.clone(), &loc), Ordering::Equal);
    }

    #[test]
    fn address_book_ids_compare_by_identity() {
        let loc = Locale::invariant();
        let plain = AbEntryId::new(AB_PROVIDER_GUID, 1, ObjectType::MailUser.code(), 7, b"");
        let with_x = AbEntryId::new(AB_PROVIDER_GUID, 1, ObjectType::MailUser.code(), 7, b"x");
        let remapped = AbEntryId::new(AB_PROVIDER_GUID, 1, ObjectType::MailUser.code(), 8, b"")
            .with_flags([1, 0, 0, 0]);

        let a = PropertyValue::Binary(plain.encode());
        let b = PropertyValue::Binary(with_x.encode());
        let c = PropertyValue::Binary(remapped.encode());
        assert_ne!(a.compare(&b, &loc), Ordering::Equal);
        assert_eq!(a.compare(&c, &loc), Ordering::Equal);
        assert_ne!(a, c);
    }

    #[test]
    fn non_ab_binary_of_ab_length_is_bytewise() {
        let loc = Locale::invariant();
        let other_guid = Uuid::from_bytes([9; 16]);
        let a = AbEntryId::new(other_guid, 0, 6, 1, b"").encode();
        let b = AbEntryId::new(other_guid, 0, 6, 1, b"").with_flags([1, 0, 0, 0]).encode();
        assert_ne!(
            PropertyValue::Binary(a).compare(&PropertyValue::Binary(b), &loc),
            Ordering::Equal
        );
    }

    #[test]
    fn numbers_and_mixed_types() {
        let loc = Locale::invariant();
        assert_eq!(
            PropertyValue::Long(-5).compare(&PropertyValue::Long(3), &loc),
            Ordering::Less
        );
        assert_eq!(
            PropertyValue::Double(2.5).compare(&PropertyValue::Double(2.5), &loc),
            Ordering::Equal
        );
        assert_eq!(
            PropertyValue::MvLong(vec![1, 2]).compare(&PropertyValue::MvLong(vec![1, 3]), &loc),
            Ordering::Less
        );
        // LONG (0x3) orders before BINARY (0x102).
        assert_eq!(
            PropertyValue::Long(100).compare(&PropertyValue::Binary(vec![]), &loc),
            Ordering::Less
        );
    }

    #[test]
    fn restrictions_of_equal_size_order_one_way() {
        let loc = Locale::invariant();
        let subject = PropertyValue::Restriction(Box::new(Restriction::Exist {
            tag: tags::PR_SUBJECT,
        }));
        let body = PropertyValue::Restriction(Box::new(Restriction::Exist { tag: tags::PR_BODY }));
        let forward = subject.compare(&body, &loc);
        assert_ne!(forward, Ordering::Equal);
        assert_eq!(body.compare(&subject, &loc), forward.reverse());
        assert_eq!(subject.compare(&subject.clone(), &loc), Ordering::Equal);

        let not = PropertyValue::Restriction(Box::new(Restriction::Not(Box::new(
            Restriction::Exist { tag: tags::PR_BODY },
        ))));
        assert_eq!(body.compare(&not, &loc), Ordering::Less);
        assert_eq!(not.compare(&body, &loc), Ordering::Greater);
    }

    #[test]
    fn actions_of_equal_size_order_one_way() {
        use crate::restriction::ActionKind;

        let loc = Locale::invariant();
        let delete = PropertyValue::Actions(vec![Action::new(ActionKind::Delete)]);
        let read = PropertyValue::Actions(vec![Action::new(ActionKind::MarkAsRead)]);
        let forward = delete.compare(&read, &loc);
        assert_ne!(forward, Ordering::Equal);
        assert_eq!(read.compare(&delete, &loc), forward.reverse());
    }
}
