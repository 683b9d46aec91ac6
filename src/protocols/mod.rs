//! Protocol implementations.
//!
//! - `staged`: first byte now, the rest of a canned HTTP response later

pub mod staged;
