//! Line sanitizer applied to every message source.
//!
//! Network chunks and operator input go through the same rule: keep the
//! printable ASCII bytes (0x20..=0x7E), drop everything else, and
//! terminate a non-empty result with a single line feed.

use std::fmt;

use tracing::trace;

use crate::error::{DomainError, DomainResult};

/// Largest raw input (in bytes) accepted for a single message.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Number of bytes read from a client socket per read call.
pub const READ_CHUNK_LEN: usize = MAX_MESSAGE_LEN - 1;

const LINE_FEED: char = '\n';

/// A sanitized, newline-terminated line of printable ASCII.
///
/// Only [`sanitize`] constructs a `Line`, so the content is never empty
/// and always ends with exactly one `\n`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Line(String);

impl Line {
    /// Returns the line including its terminator.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the wire bytes of the line including its terminator.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Returns the line without its terminator.
    pub fn text(&self) -> &str {
        self.0.strip_suffix(LINE_FEED).unwrap_or(&self.0)
    }

    /// Length on the wire, terminator included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`: a `Line` carries at least one printable byte.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns true for bytes that survive sanitization.
#[inline]
pub fn is_printable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte)
}

/// Sanitizes a raw chunk into a relayable line.
///
/// Returns `Ok(None)` when no printable byte survives; callers must treat
/// that as "no message" and neither print nor relay anything.
///
/// # Errors
///
/// Returns [`DomainError::MessageTooLong`] when `raw` is longer than
/// [`MAX_MESSAGE_LEN`]. The input is rejected as a whole, never truncated.
pub fn sanitize(raw: &[u8]) -> DomainResult<Option<Line>> {
    if raw.len() > MAX_MESSAGE_LEN {
        return Err(DomainError::MessageTooLong {
            len: raw.len(),
            max: MAX_MESSAGE_LEN,
        });
    }

    let mut line: String = raw
        .iter()
        .copied()
        .filter(|&b| is_printable(b))
        .map(char::from)
        .collect();

    let dropped = raw.len() - line.len();
    if dropped > 0 {
        trace!(dropped, "Dropped non-printable bytes");
    }

    if line.is_empty() {
        return Ok(None);
    }

    line.push(LINE_FEED);
    Ok(Some(Line(line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitized(raw: &[u8]) -> Option<String> {
        sanitize(raw).unwrap().map(|line| line.as_str().to_string())
    }

    #[test]
    fn test_keeps_printable_ascii_and_terminates() {
        assert_eq!(sanitized(b"hello"), Some("hello\n".to_string()));
    }

    #[test]
    fn test_drops_control_and_high_bytes() {
        assert_eq!(sanitized(b"A\x01B\x7fC\x7e"), Some("ABC~\n".to_string()));
    }

    #[test]
    fn test_drops_non_ascii_utf8() {
        assert_eq!(sanitized("caf\u{e9}!".as_bytes()), Some("caf!\n".to_string()));
    }

    #[test]
    fn test_all_control_bytes_is_no_message() {
        assert_eq!(sanitized(b"\x00\x01\r\n\x1b\x7f"), None);
        assert_eq!(sanitized(b""), None);
        assert_eq!(sanitized(b"\n"), None);
    }

    #[test]
    fn test_terminated_line_is_fixed_point() {
        assert_eq!(sanitized(b"hi\n"), Some("hi\n".to_string()));

        let once = sanitize(b"hi\r\n").unwrap().unwrap();
        let twice = sanitize(once.as_bytes()).unwrap().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_space_and_tilde_are_boundaries() {
        assert!(is_printable(b' '));
        assert!(is_printable(b'~'));
        assert!(!is_printable(0x1f));
        assert!(!is_printable(0x7f));
        assert!(!is_printable(0x80));
    }

    #[test]
    fn test_max_length_accepted() {
        let raw = vec![b'x'; MAX_MESSAGE_LEN];
        let line = sanitize(&raw).unwrap().unwrap();
        assert_eq!(line.len(), MAX_MESSAGE_LEN + 1);
    }

    #[test]
    fn test_oversize_rejected() {
        let raw = vec![b'x'; MAX_MESSAGE_LEN + 1];
        assert_eq!(
            sanitize(&raw),
            Err(DomainError::MessageTooLong {
                len: MAX_MESSAGE_LEN + 1,
                max: MAX_MESSAGE_LEN,
            })
        );
    }

    #[test]
    fn test_oversize_rejected_even_if_mostly_control() {
        let raw = vec![0u8; MAX_MESSAGE_LEN + 1];
        assert!(sanitize(&raw).is_err());
    }

    #[test]
    fn test_line_accessors() {
        let line = sanitize(b"\tabc").unwrap().unwrap();
        assert_eq!(line.text(), "abc");
        assert_eq!(line.as_bytes(), b"abc\n");
        assert_eq!(line.to_string(), "abc\n");
        assert!(!line.is_empty());
    }

    #[test]
    fn test_read_chunk_fits_under_max() {
        assert!(READ_CHUNK_LEN < MAX_MESSAGE_LEN);
    }
}
