//! Framing helpers for reading requests off a byte stream.
//!
//! The portal reads a request in two phases: bytes up to the blank line that
//! ends the head, then whatever body the head announces. These helpers tell
//! the reader when each phase is done without doing any I/O themselves.

use crate::request::parse_request;

/// Blank line separating head and body.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// How many body bytes to wait for once the head is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyExpectation {
    /// No body follows.
    None,
    /// Exactly this many bytes follow the head.
    Exact(usize),
    /// Length unknown; some browsers send form data in a separate segment
    /// right after the head, so one more read is worth trying.
    Continuation,
}

/// Offset of the header terminator, if present.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

/// Decide what body to wait for, given a buffer that holds the full head.
///
/// Heads that do not parse expect nothing; the full parse reports them.
pub fn body_expectation(buf: &[u8]) -> BodyExpectation {
    let head_len = match find_header_end(buf) {
        Some(end) => end + HEADER_TERMINATOR.len(),
        None => return BodyExpectation::None,
    };

    match parse_request(&buf[..head_len]) {
        Ok(request) => match request.content_length() {
            Ok(Some(length)) => BodyExpectation::Exact(length),
            Ok(None) if request.method.expects_body() => BodyExpectation::Continuation,
            _ => BodyExpectation::None,
        },
        Err(_) => BodyExpectation::None,
    }
}

/// Quick check for an HTTP marker before attempting a full parse.
pub fn looks_like_http(buf: &[u8]) -> bool {
    buf.windows(5).any(|w| w == b"HTTP/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r\n"), Some(14));
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n"), None);
        assert_eq!(find_header_end(b""), None);
    }

    #[test]
    fn test_body_expectation() {
        assert_eq!(
            body_expectation(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"),
            BodyExpectation::None
        );
        assert_eq!(
            body_expectation(b"POST /configure HTTP/1.1\r\nContent-Length: 12\r\n\r\n"),
            BodyExpectation::Exact(12)
        );
        assert_eq!(
            body_expectation(b"POST /configure HTTP/1.1\r\nHost: x\r\n\r\n"),
            BodyExpectation::Continuation
        );
        assert_eq!(body_expectation(b"POST /configure HTTP/1.1\r\n"), BodyExpectation::None);
        assert_eq!(body_expectation(b"garbage\r\n\r\n"), BodyExpectation::None);
    }

    #[test]
    fn test_http_marker_detection() {
        assert!(looks_like_http(b"GET / HTTP/1.1\r\n"));
        assert!(!looks_like_http(b"\x16\x03\x01\x02\x00"));
        assert!(!looks_like_http(b""));
    }
}
