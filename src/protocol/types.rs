//! Response Headers
//!
//! The server only ever produces three kinds of response header:
//!
//! ```text
//! HTTP/1.0 200 OK\r\nContent-Length: 12\r\n\r\n
//! HTTP/1.0 404 Not Found\r\n\r\n
//! HTTP/1.0 403 Forbidden\r\n\r\n
//! ```
//!
//! The protocol token is echoed from the request. A 200 header is followed
//! by the raw file bytes; the other two carry no body.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used in status and header lines
pub const CRLF: &[u8] = b"\r\n";

/// Status of a response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Forbidden,
    NotFound,
}

impl Status {
    /// Numeric status code.
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Forbidden => 403,
            Status::NotFound => 404,
        }
    }

    /// Reason phrase sent after the code.
    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

fn render(protocol: &str, status: Status, content_length: Option<u64>) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_slice(format!("{} {}", protocol, status).as_bytes());
    buf.put_slice(CRLF);
    if let Some(len) = content_length {
        buf.put_slice(format!("Content-Length: {}", len).as_bytes());
        buf.put_slice(CRLF);
    }
    buf.put_slice(CRLF);
    buf.freeze()
}

/// Renders a `200 OK` header announcing a body of `length` bytes.
///
/// # Example
/// ```
/// use minihttpd::protocol::render_ok;
///
/// let header = render_ok("HTTP/1.0", 12);
/// assert_eq!(&header[..], b"HTTP/1.0 200 OK\r\nContent-Length: 12\r\n\r\n");
/// ```
pub fn render_ok(protocol: &str, length: u64) -> Bytes {
    render(protocol, Status::Ok, Some(length))
}

/// Renders a `404 Not Found` header.
pub fn render_not_found(protocol: &str) -> Bytes {
    render(protocol, Status::NotFound, None)
}

/// Renders a `403 Forbidden` header.
pub fn render_forbidden(protocol: &str) -> Bytes {
    render(protocol, Status::Forbidden, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_ok() {
        assert_eq!(
            &render_ok("HTTP/1.0", 0)[..],
            b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[test]
    fn test_render_echoes_protocol() {
        assert!(render_not_found("HTTP/1.1").starts_with(b"HTTP/1.1 404"));
    }

    #[test]
    fn test_render_not_found() {
        assert_eq!(&render_not_found("HTTP/1.0")[..], b"HTTP/1.0 404 Not Found\r\n\r\n");
    }

    #[test]
    fn test_render_forbidden() {
        assert_eq!(&render_forbidden("HTTP/1.0")[..], b"HTTP/1.0 403 Forbidden\r\n\r\n");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Ok.to_string(), "200 OK");
        assert_eq!(Status::NotFound.to_string(), "404 Not Found");
    }
}
