//! Reversible author encoding for archive headers
//!
//! Archive author fields only accept ASCII letters and `-`. Every other byte
//! of the UTF-8 author name is percent-escaped, and the `%` marker is then
//! written as `_`, so an encoded author only ever contains `[A-Za-z0-9_-]`.

use regex::Regex;
use std::sync::LazyLock;

/// Encoded form of the empty (unknown/guest) author
pub const EMPTY_AUTHOR: &str = "_";

const MARKER: u8 = b'_';

/// Conservative shape of author names stored before escaping existed
static LEGACY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.]+$").expect("legacy author pattern"));

fn is_safe(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'-'
}

/// Encode an author name for an archive header
pub fn encode(author: &str) -> String {
    if author.is_empty() {
        return EMPTY_AUTHOR.to_string();
    }

    let mut out = String::with_capacity(author.len());
    for byte in author.bytes() {
        if is_safe(byte) {
            out.push(byte as char);
        } else {
            out.push(MARKER as char);
            out.push_str(&format!("{:02X}", byte));
        }
    }
    out
}

/// Decode an author header value, never failing
///
/// Values that do not un-escape cleanly come from archives written before
/// the escaping scheme; they are kept verbatim when they look like a plain
/// user name and dropped otherwise.
pub fn decode(encoded: &str) -> String {
    if encoded == EMPTY_AUTHOR {
        return String::new();
    }

    match unescape(encoded) {
        Some(author) => author,
        None if LEGACY_NAME.is_match(encoded) => encoded.to_string(),
        None => {
            tracing::debug!("Discarding undecodable author {:?}", encoded);
            String::new()
        }
    }
}

fn unescape(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == MARKER {
            let hex = bytes.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
