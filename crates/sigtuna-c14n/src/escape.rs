#![forbid(unsafe_code)]

//! Entity escaping for C14N output.
//!
//! Per the C14N spec:
//! - Text nodes: `&` → `&amp;`, `<` → `&lt;`, `>` → `&gt;`, `\r` → `&#xD;`
//! - Attribute values: additionally `"` → `&quot;`, `\t` → `&#x9;`, `\n` → `&#xA;`
//! - PI data: `\r` → `&#xD;`
//!
//! The canonicalizer assembles its output in a byte buffer, so these write
//! straight into one instead of allocating per node.

/// Escape text node content per C14N rules into `out`.
pub fn text_into(s: &str, out: &mut Vec<u8>) {
    for &b in s.as_bytes() {
        match b {
            b'&' => out.extend_from_slice(b"&amp;"),
            b'<' => out.extend_from_slice(b"&lt;"),
            b'>' => out.extend_from_slice(b"&gt;"),
            b'\r' => out.extend_from_slice(b"&#xD;"),
            _ => out.push(b),
        }
    }
}

/// Escape an attribute value per C14N rules into `out`.
pub fn attr_into(s: &str, out: &mut Vec<u8>) {
    for &b in s.as_bytes() {
        match b {
            b'&' => out.extend_from_slice(b"&amp;"),
            b'<' => out.extend_from_slice(b"&lt;"),
            b'"' => out.extend_from_slice(b"&quot;"),
            b'\t' => out.extend_from_slice(b"&#x9;"),
            b'\n' => out.extend_from_slice(b"&#xA;"),
            b'\r' => out.extend_from_slice(b"&#xD;"),
            _ => out.push(b),
        }
    }
}

/// Escape processing instruction data into `out`.
pub fn pi_into(s: &str, out: &mut Vec<u8>) {
    for &b in s.as_bytes() {
        match b {
            b'\r' => out.extend_from_slice(b"&#xD;"),
            _ => out.push(b),
        }
    }
}
