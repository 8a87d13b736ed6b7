//! Input encoding detection
//!
//! The event source works on UTF-8 only. UTF-16 input (by BOM, or by the
//! `<\0` / `\0<` pattern of an undeclared document) is transcoded first and a
//! UTF-8 BOM is dropped.

use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl XmlEncoding {
    /// Detect encoding from byte order mark or initial bytes
    pub fn detect(input: &[u8]) -> Self {
        match input {
            [0xFF, 0xFE, ..] | [b'<', 0x00, ..] => XmlEncoding::Utf16Le,
            [0xFE, 0xFF, ..] | [0x00, b'<', ..] => XmlEncoding::Utf16Be,
            _ => XmlEncoding::Utf8,
        }
    }
}

/// Bring the input to UTF-8 without copying when it already is
///
/// Only checks the transcoding; UTF-8 validity of the result is checked by
/// the event source so it can report a position.
pub fn to_utf8(input: &[u8]) -> Result<Cow<'_, [u8]>, String> {
    match XmlEncoding::detect(input) {
        XmlEncoding::Utf8 => Ok(Cow::Borrowed(input.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(input))),
        XmlEncoding::Utf16Le => decode_utf16(input.strip_prefix(b"\xFF\xFE").unwrap_or(input), u16::from_le_bytes, "LE"),
        XmlEncoding::Utf16Be => decode_utf16(input.strip_prefix(b"\xFE\xFF").unwrap_or(input), u16::from_be_bytes, "BE"),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16, label: &str) -> Result<Cow<'static, [u8]>, String> {
    if bytes.len() % 2 != 0 {
        return Err(format!("UTF-16 {label} input has an odd number of bytes"));
    }

    let code_units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();

    String::from_utf16(&code_units)
        .map(|s| Cow::Owned(s.into_bytes()))
        .map_err(|e| format!("invalid UTF-16 {label}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(XmlEncoding::detect(b"<root/>"), XmlEncoding::Utf8);
        assert_eq!(XmlEncoding::detect(&[0xEF, 0xBB, 0xBF, b'<']), XmlEncoding::Utf8);
        assert_eq!(XmlEncoding::detect(&[0xFF, 0xFE, b'<', 0x00]), XmlEncoding::Utf16Le);
        assert_eq!(XmlEncoding::detect(&[0x00, b'<', 0x00, b'a']), XmlEncoding::Utf16Be);
        assert_eq!(XmlEncoding::detect(b"<"), XmlEncoding::Utf8);
    }

    #[test]
    fn test_utf8_is_borrowed() {
        let input = b"<root>hello</root>";
        assert!(matches!(to_utf8(input), Ok(Cow::Borrowed(b)) if b == input));
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let input = [0xEF, 0xBB, 0xBF, b'<', b'a', b'/', b'>'];
        assert_eq!(to_utf8(&input).unwrap().as_ref(), b"<a/>");
    }

    #[test]
    fn test_utf16_le() {
        let input = [0xFF, 0xFE, b'<', 0, b'r', 0, b'/', 0, b'>', 0];
        assert_eq!(to_utf8(&input).unwrap().as_ref(), b"<r/>");
    }

    #[test]
    fn test_utf16_be_without_bom() {
        let input = [0, b'<', 0, b'r', 0, b'/', 0, b'>'];
        assert_eq!(to_utf8(&input).unwrap().as_ref(), b"<r/>");
    }

    #[test]
    fn test_utf16_odd_length() {
        assert!(to_utf8(&[0xFF, 0xFE, b'<']).is_err());
    }
}
