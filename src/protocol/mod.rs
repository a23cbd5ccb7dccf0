//! Request/Response Protocol
//!
//! A deliberately tiny subset of HTTP/1.0: one `GET` request line per
//! connection, one response header, an optional file body, then close.
//!
//! ## Modules
//!
//! - `parser`: header-complete detection and request-line parsing
//! - `types`: response header rendering
//!
//! ## Example
//!
//! ```
//! use minihttpd::protocol::{header_is_complete, parse_request, render_not_found};
//!
//! let data = b"GET /nope HTTP/1.0\r\n\r\n";
//! assert!(header_is_complete(data));
//!
//! let request = parse_request(data).unwrap();
//! let header = render_not_found(&request.protocol);
//! assert!(header.starts_with(b"HTTP/1.0 404"));
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{header_is_complete, parse_request, ParseError, ParseResult, Request};
pub use types::{render_forbidden, render_not_found, render_ok, Status};
