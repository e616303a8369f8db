//! Narrow text transcoding (Windows-1252).
//!
//! Narrow strings only exist at the boundary: as caller input and as
//! requested output. Everything stored is wide.

/// Code points for bytes 0x80..=0x9F. Unassigned bytes map to the C1 control
/// of the same value.
const HIGH_TABLE: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

/// Substitute for characters the code page cannot represent.
const REPLACEMENT: u8 = b'?';

fn decode_byte(b: u8) -> char {
    match b {
        0x80..=0x9F => HIGH_TABLE[usize::from(b - 0x80)],
        _ => char::from(b),
    }
}

fn encode_char(c: char) -> u8 {
    let cp = u32::from(c);
    if cp < 0x80 || (0xA0..=0xFF).contains(&cp) {
        return cp as u8;
    }
    HIGH_TABLE
        .iter()
        .position(|candidate| *candidate == c)
        .map_or(REPLACEMENT, |idx| 0x80 + idx as u8)
}

/// Decodes narrow bytes into a wide string. Never fails.
pub fn narrow_to_wide(bytes: &[u8]) -> String {
    bytes.iter().copied().map(decode_byte).collect()
}

/// Appends the decoded form of `bytes` to `out`, reusing its allocation.
pub(crate) fn narrow_into(bytes: &[u8], out: &mut String) {
    out.clear();
    out.extend(bytes.iter().copied().map(decode_byte));
}

/// Encodes a wide string as narrow bytes; unmappable characters become `?`.
pub fn wide_to_narrow(text: &str) -> Vec<u8> {
    text.chars().map(encode_char).collect()
}
