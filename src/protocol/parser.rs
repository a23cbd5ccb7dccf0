//! Request Parser
//!
//! Requests are a single request line followed by optional header lines
//! and an empty line:
//!
//! ```text
//! GET /hello.txt HTTP/1.0\r\n
//! User-Agent: curl/8.0\r\n
//! \r\n
//! ```
//!
//! Only the request line matters to the server. Header fields are accepted
//! and ignored.
//!
//! The parser is split in two steps so callers can accumulate bytes from a
//! socket and cheaply ask "is it all here yet?" before doing any real work:
//!
//! 1. [`header_is_complete`] scans for the blank line that ends the header.
//! 2. [`parse_request`] extracts the resource name and protocol token.

use thiserror::Error;

/// Errors that can occur while parsing a request line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The buffer holds no request line at all
    #[error("empty request")]
    Empty,

    /// The request line is not valid UTF-8
    #[error("request line is not valid UTF-8")]
    InvalidUtf8,

    /// The request line does not have the `METHOD RESOURCE PROTOCOL` shape
    #[error("invalid request line: {0:?}")]
    InvalidRequestLine(String),

    /// Only `GET` is served
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum length of a resource name, in bytes.
pub const MAX_RESOURCE_LEN: usize = 1024;

/// Maximum length of a protocol token, in bytes.
pub const MAX_PROTOCOL_LEN: usize = 16;

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The requested resource, exactly as sent (e.g. `/hello.txt`)
    pub resource: String,
    /// The protocol token (e.g. `HTTP/1.0`), echoed back in the response
    pub protocol: String,
}

/// Returns true once `buf` contains the end-of-header marker.
///
/// Both `\r\n\r\n` and a bare `\n\n` are accepted so that hand-typed
/// requests from `nc` work too.
pub fn header_is_complete(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.windows(2).any(|w| w == b"\n\n")
}

/// Parses the request line at the start of `buf`.
///
/// # Example
///
/// ```
/// use minihttpd::protocol::parse_request;
///
/// let request = parse_request(b"GET /index.html HTTP/1.0\r\n\r\n").unwrap();
/// assert_eq!(request.resource, "/index.html");
/// assert_eq!(request.protocol, "HTTP/1.0");
/// ```
pub fn parse_request(buf: &[u8]) -> ParseResult<Request> {
    let line_end = buf.iter().position(|&b| b == b'\n').unwrap_or(buf.len());
    let line = std::str::from_utf8(&buf[..line_end]).map_err(|_| ParseError::InvalidUtf8)?;
    let line = line.trim_end_matches('\r');

    if line.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parts = line.split_whitespace();
    let (Some(method), Some(resource), Some(protocol), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::InvalidRequestLine(line.to_string()));
    };

    if method != "GET" {
        return Err(ParseError::UnsupportedMethod(method.to_string()));
    }

    if resource.len() > MAX_RESOURCE_LEN || protocol.len() > MAX_PROTOCOL_LEN {
        return Err(ParseError::InvalidRequestLine(line.to_string()));
    }

    Ok(Request {
        resource: resource.to_string(),
        protocol: protocol.to_string(),
    })
}
