//! The canned HTTP response served to every connection.
//!
//! The response is built once at startup and never changes afterwards:
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: text/html\r\n
//! Content-Length: 15\r\n
//! Server: golang test server\r\n
//! Date: <RFC 1123 timestamp at startup>\r\n
//! Cache-Control: no-cache\r\n
//! \r\n
//! Hello, World!\r\n
//! ```
//!
//! It is written to the wire in two fragments: the first byte of the
//! status line on its own, then everything else.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

const STATUS_LINE: &str = "HTTP/1.1 200 OK\r\n";
const BODY: &str = "Hello, World!\r\n";

/// Number of bytes sent before the stall.
const FIRST_FRAGMENT_LEN: usize = 1;

/// RFC 1123 date, as used by the HTTP `Date` header.
const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Immutable status line + headers + body, shared by all handlers.
#[derive(Debug, Clone)]
pub struct ResponseTemplate {
    bytes: Bytes,
    headers_start: usize,
    body_start: usize,
}

impl ResponseTemplate {
    /// Build the template, stamping `Date` with `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        let headers = format!(
            "Content-Type: text/html\r\n\
             Content-Length: {}\r\n\
             Server: golang test server\r\n\
             Date: {}\r\n\
             Cache-Control: no-cache\r\n\
             \r\n",
            BODY.len(),
            now.format(RFC1123_FORMAT)
        );

        let mut buf = BytesMut::with_capacity(STATUS_LINE.len() + headers.len() + BODY.len());
        buf.put_slice(STATUS_LINE.as_bytes());
        buf.put_slice(headers.as_bytes());
        buf.put_slice(BODY.as_bytes());

        let headers_start = STATUS_LINE.len();
        ResponseTemplate {
            bytes: buf.freeze(),
            headers_start,
            body_start: headers_start + headers.len(),
        }
    }

    /// Fragment A: the leading byte of the status line.
    pub fn first_fragment(&self) -> &[u8] {
        &self.bytes[..FIRST_FRAGMENT_LEN]
    }

    /// Fragment B: the rest of the status line, the headers and the body.
    pub fn remainder(&self) -> &[u8] {
        &self.bytes[FIRST_FRAGMENT_LEN..]
    }

    pub fn status_line(&self) -> &[u8] {
        &self.bytes[..self.headers_start]
    }

    /// Header lines including the terminating blank line.
    pub fn headers(&self) -> &[u8] {
        &self.bytes[self.headers_start..self.body_start]
    }

    pub fn body(&self) -> &[u8] {
        &self.bytes[self.body_start..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
