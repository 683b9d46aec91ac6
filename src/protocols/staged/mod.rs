//! Staged response protocol.
//!
//! Impersonates an HTTP/1.1 server in order to control Time To First Byte:
//! - Client sends any request terminated by a blank line
//! - Server sends the single byte `H` and flushes it
//! - Server stalls for [`STAGE_DELAY`]
//! - Server sends the rest of the canned response and closes
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  GET /anything HTTP/1.1\r\nHost: x\r\n\r\n
//! Response: H
//!           <10 seconds>
//!           TTP/1.1 200 OK\r\n<headers>\r\nHello, World!\r\n
//! ```
//!
//! Method, path, headers and request body are never inspected, and every
//! connection serves exactly one exchange.

pub mod handler;
pub mod request;

pub use handler::{handle_connection, STAGE_DELAY};
