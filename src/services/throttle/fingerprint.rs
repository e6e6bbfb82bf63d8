//! Fingerprinting of error reports for notification throttling.
//!
//! A fingerprint is derived from the script URL and line number only. The
//! message text is deliberately excluded: two reports from the same line of
//! the same script are the same error for notification purposes.
//!
//! The URL is canonicalized before hashing so that cosmetically different
//! spellings of one resource (host case, default port, percent-encoding
//! variants, raw non-ASCII characters) produce the same key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::{Position, Url};

use crate::models::ErrorReport;

/// Throttle cache key derived from `(url, line)`.
///
/// Format: `jserrorlog.notify.<sha256 hex of canonical url>:<line>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintKey(String);

impl FingerprintKey {
    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FingerprintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives stable fingerprint keys from error reports.
///
/// # Example
///
/// ```rust
/// use jserrorlog::Fingerprinter;
///
/// let a = Fingerprinter::fingerprint("http://example.com/static/app%2Ejs", 87);
/// let b = Fingerprinter::fingerprint("HTTP://Example.com:80/static/app.js", 87);
/// assert_eq!(a, b);
/// ```
pub struct Fingerprinter;

impl Fingerprinter {
    /// Prefix shared by every throttle key.
    pub const KEY_PREFIX: &'static str = "jserrorlog.notify";

    /// Computes the fingerprint key for a script URL and line number.
    #[must_use]
    pub fn fingerprint(url: &str, line: u32) -> FingerprintKey {
        let normalized = Self::normalize_url(url);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let digest = hex::encode(hasher.finalize());
        FingerprintKey(format!("{}.{digest}:{line}", Self::KEY_PREFIX))
    }

    /// Computes the fingerprint key for a report.
    #[must_use]
    pub fn for_report(report: &ErrorReport) -> FingerprintKey {
        Self::fingerprint(&report.url, report.line)
    }

    /// Canonicalizes a URL for hashing.
    ///
    /// Absolute URLs go through WHATWG parsing (lowercased scheme and host,
    /// default port dropped, dot segments resolved, non-ASCII encoded).
    /// Anything that does not parse is IRI-encoded as-is. In both cases
    /// percent-escapes of unreserved characters are decoded and the remaining
    /// escapes are upper-cased.
    ///
    /// # Example
    ///
    /// ```rust
    /// use jserrorlog::Fingerprinter;
    ///
    /// assert_eq!(
    ///     Fingerprinter::normalize_url("http://Example.com/a/../%7euser/app.js"),
    ///     "http://example.com/~user/app.js"
    /// );
    /// ```
    #[must_use]
    pub fn normalize_url(raw: &str) -> String {
        let trimmed = raw.trim();
        match Url::parse(trimmed) {
            Ok(parsed) if !parsed.cannot_be_a_base() => {
                let mut normalized = parsed[..Position::BeforePath].to_string();
                normalized.push_str(&normalize_escapes(&parsed[Position::BeforePath..]));
                normalized
            },
            _ => normalize_escapes(&iri_to_uri(trimmed)),
        }
    }
}

/// Characters left untouched by IRI-to-URI encoding besides ASCII alphanumerics.
const IRI_SAFE: &[u8] = b"-._~/#%[]=:;$&()+,!?*@'";

/// Percent-encodes every byte outside the URI-safe set.
fn iri_to_uri(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || IRI_SAFE.contains(&byte) {
            out.push(char::from(byte));
        } else {
            push_escape(&mut out, byte);
        }
    }
    out
}

/// Decodes escapes of unreserved characters and upper-cases the rest.
///
/// Input is ASCII (URL serialization or IRI-encoded output).
fn normalize_escapes(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                let decoded = (hi << 4) | lo;
                if is_unreserved(decoded) {
                    out.push(char::from(decoded));
                } else {
                    push_escape(&mut out, decoded);
                }
                i += 3;
                continue;
            }
        }
        out.push(char::from(bytes[i]));
        i += 1;
    }
    out
}

const fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn push_escape(out: &mut String, byte: u8) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    out.push('%');
    out.push(char::from(HEX[usize::from(byte >> 4)]));
    out.push(char::from(HEX[usize::from(byte & 0x0f)]));
}
