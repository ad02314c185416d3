//! Path encoding for manifest entries.
//!
//! A path is UTF-8 encoded, then every byte outside a conservative safe
//! alphabet is percent-escaped, then the whole thing is wrapped in single
//! quotes (so the empty string is representable). Decoding reverses the
//! steps. The escape set excludes `|`, since manifest lines use ` | ` as a
//! field separator and an unescaped `|` in a path would otherwise corrupt
//! the line grammar on read-back.

/// Characters that pass through unescaped. Deliberately conservative: no
/// whitespace, no shell metacharacters, no `|` (reserved by the manifest
/// line format), no `'` (used to wrap the encoded string), no `%` (the
/// escape marker itself).
const SAFE: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-:.";

fn is_safe(b: u8) -> bool {
    SAFE.contains(&b)
}

/// Encode a path (or any Unicode string) into the manifest's percent-quoted
/// form: `'...'` where `...` is UTF-8 bytes with every unsafe byte replaced
/// by `%XX` (uppercase hex).
#[must_use]
pub fn spencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for b in s.as_bytes() {
        if is_safe(*b) {
            out.push(*b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out.push('\'');
    out
}

/// Inverse of [`spencode`].
///
/// # Errors
/// Returns an error if the string is not quote-wrapped, contains a
/// malformed `%XX` escape, or the decoded bytes are not valid UTF-8.
pub fn spdecode(s: &str) -> Result<String, String> {
    let bytes = s.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'\'' || bytes[bytes.len() - 1] != b'\'' {
        return Err(format!("expected single-quote-wrapped string, got {s:?}"));
    }
    let inner = &bytes[1..bytes.len() - 1];

    let mut decoded = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        if inner[i] == b'%' {
            if i + 2 >= inner.len() {
                return Err(format!("truncated %-escape in {s:?}"));
            }
            let hex = std::str::from_utf8(&inner[i + 1..i + 3])
                .map_err(|_| format!("non-ASCII %-escape in {s:?}"))?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| format!("invalid hex {hex:?} in {s:?}"))?;
            decoded.push(byte);
            i += 3;
        } else {
            decoded.push(inner[i]);
            i += 1;
        }
    }

    String::from_utf8(decoded).map_err(|e| format!("decoded bytes are not valid UTF-8: {e}"))
}
