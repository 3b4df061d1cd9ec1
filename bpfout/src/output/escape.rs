//! String escaping for JSON records
//!
//! Collected strings are raw bytes that need not be valid UTF-8. Valid UTF-8
//! passes through untouched; quotes, backslashes and control characters get
//! JSON escapes; bytes that are not part of valid UTF-8 become `\u00XX`.
//! [`unescape`] inverts this exactly, so no byte (NUL included) is lost.

use std::fmt::Write;

/// Escape raw bytes for use inside a JSON string literal
pub fn escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                '\u{8}' => out.push_str("\\b"),
                '\u{c}' => out.push_str("\\f"),
                c if c < ' ' || c == '\u{7f}' => {
                    let _ = write!(out, "\\u{:04x}", u32::from(c));
                }
                c => out.push(c),
            }
        }
        for b in chunk.invalid() {
            let _ = write!(out, "\\u{b:04x}");
        }
    }
    out
}

/// Invert [`escape`]; `None` for a malformed escape sequence
///
/// `\u0080`..`\u00ff` decode to a single raw byte, since `escape` only
/// produces them for bytes outside valid UTF-8.
pub fn unescape(escaped: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next()? {
            '"' => out.push(b'"'),
            '\\' => out.push(b'\\'),
            '/' => out.push(b'/'),
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'u' => {
                let digits: String = chars.by_ref().take(4).collect();
                if digits.len() != 4 {
                    return None;
                }
                let code = u32::from_str_radix(&digits, 16).ok()?;
                if let Ok(byte) = u8::try_from(code) {
                    out.push(byte);
                } else {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(char::from_u32(code)?.encode_utf8(&mut buf).as_bytes());
                }
            }
            _ => return None,
        }
    }
    Some(out)
}
