//! XML Entity Decoding
//!
//! Handles the reference forms the event source expands itself:
//! - Built-in entities: &lt; &gt; &amp; &quot; &apos;
//! - Numeric character references: &#123; &#x7B;
//!
//! Declared (DTD) entities are looked up by the event source in `dtd::EntityTable`.

use memchr::memchr;
use std::borrow::Cow;

/// Replacement text of one of the five predefined entities
#[inline]
pub fn predefined_entity(name: &[u8]) -> Option<&'static str> {
    match name {
        b"lt" => Some("<"),
        b"gt" => Some(">"),
        b"amp" => Some("&"),
        b"quot" => Some("\""),
        b"apos" => Some("'"),
        _ => None,
    }
}

/// Decode the body of a character reference (the part after `&#`, before `;`)
///
/// Returns None for malformed digits or code points outside the XML Char production.
pub fn decode_char_ref(body: &[u8]) -> Option<char> {
    if body.is_empty() {
        return None;
    }

    let codepoint = if body[0] == b'x' {
        let hex = std::str::from_utf8(&body[1..]).ok()?;
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(hex, 16).ok()?
    } else {
        let dec = std::str::from_utf8(body).ok()?;
        if !dec.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        dec.parse::<u32>().ok()?
    };

    if !is_valid_xml_char(codepoint) {
        return None;
    }
    char::from_u32(codepoint)
}

/// Check if a code point is a valid XML 1.0 Char
/// Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
#[inline]
pub fn is_valid_xml_char(codepoint: u32) -> bool {
    matches!(codepoint,
        0x9 | 0xA | 0xD |
        0x20..=0xD7FF |
        0xE000..=0xFFFD |
        0x10000..=0x10FFFF
    )
}

/// Split a reference starting at `&` into its name and total length (including `&` and `;`)
pub fn split_reference(input: &[u8]) -> Option<(&[u8], usize)> {
    debug_assert_eq!(input.first(), Some(&b'&'));
    let semi = memchr(b';', input)?;
    let name = &input[1..semi];
    if name.is_empty() || name.iter().any(|&b| matches!(b, b'&' | b'<' | b' ' | b'\t' | b'\n' | b'\r')) {
        return None;
    }
    Some((name, semi + 1))
}

/// Attribute-value normalization: literal tab, CR and LF become spaces
///
/// Character references are expanded before this runs only on literal text,
/// so `&#10;` survives as a newline.
#[inline]
pub fn normalize_attribute_whitespace(raw: &str) -> Cow<'_, str> {
    if !raw.bytes().any(|b| matches!(b, b'\t' | b'\n' | b'\r')) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(
        raw.chars()
            .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined() {
        assert_eq!(predefined_entity(b"lt"), Some("<"));
        assert_eq!(predefined_entity(b"apos"), Some("'"));
        assert_eq!(predefined_entity(b"nbsp"), None);
    }

    #[test]
    fn test_numeric_decimal() {
        assert_eq!(decode_char_ref(b"65"), Some('A'));
    }

    #[test]
    fn test_numeric_hex() {
        assert_eq!(decode_char_ref(b"x41"), Some('A'));
        assert_eq!(decode_char_ref(b"x1F600"), Some('😀'));
    }

    #[test]
    fn test_invalid_char_refs() {
        assert_eq!(decode_char_ref(b"0"), None);
        assert_eq!(decode_char_ref(b"xD800"), None);
        assert_eq!(decode_char_ref(b"x"), None);
        assert_eq!(decode_char_ref(b"12a"), None);
        assert_eq!(decode_char_ref(b"X41"), None);
    }

    #[test]
    fn test_split_reference() {
        assert_eq!(split_reference(b"&amp; rest"), Some((b"amp" as &[u8], 5)));
        assert_eq!(split_reference(b"&amp rest"), None);
        assert_eq!(split_reference(b"&;"), None);
    }

    #[test]
    fn test_attribute_whitespace() {
        assert!(matches!(normalize_attribute_whitespace("a b"), Cow::Borrowed(_)));
        assert_eq!(normalize_attribute_whitespace("a\tb\r\nc"), "a b  c");
    }
}
