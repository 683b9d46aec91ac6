//! Request consumption for the staged protocol.
//!
//! The request is never interpreted. Lines are read and thrown away until
//! one of them is blank, which marks the end of the HTTP header block.
//! Line contents are never kept: at most [`MAX_FRAGMENT_LEN`] bytes of the
//! current line are buffered while deciding whether it is blank.

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Largest piece of a line held in memory at once.
const MAX_FRAGMENT_LEN: usize = 4096;

/// How request consumption stopped.
#[derive(Debug)]
pub enum RequestEnd {
    /// A blank line terminated the header block.
    BlankLine,
    /// The peer closed its side before a blank line arrived.
    Eof,
    /// Reading failed before a blank line arrived.
    Error(io::Error),
}

/// Read and discard lines until a line that is empty after trimming
/// whitespace. Bytes after the blank line are left in `reader`.
///
/// Whitespace is Unicode whitespace, so a line of only `U+00A0` counts as
/// blank. Bytes that are not valid UTF-8 make a line non-blank.
pub async fn consume_request<R>(reader: &mut R) -> RequestEnd
where
    R: AsyncBufRead + Unpin,
{
    let mut line = LineScanner::new();

    loop {
        let available = match reader.fill_buf().await {
            Ok([]) => return RequestEnd::Eof,
            Ok(buf) => buf,
            Err(e) => return RequestEnd::Error(e),
        };

        let (used, end_of_line) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        line.push(&available[..used]);
        reader.consume(used);

        if end_of_line && line.finish() {
            return RequestEnd::BlankLine;
        }
    }
}

/// Tracks whether the current line holds anything but whitespace.
struct LineScanner {
    pending: Vec<u8>,
    non_blank: bool,
}

impl LineScanner {
    fn new() -> Self {
        LineScanner {
            pending: Vec::with_capacity(MAX_FRAGMENT_LEN),
            non_blank: false,
        }
    }

    fn push(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let take = (MAX_FRAGMENT_LEN - self.pending.len()).min(bytes.len());
            self.pending.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];

            if self.pending.len() == MAX_FRAGMENT_LEN {
                self.scan(false);
            }
        }
    }

    /// End the current line, returning whether it was blank.
    fn finish(&mut self) -> bool {
        self.scan(true);
        let blank = !self.non_blank;
        self.non_blank = false;
        blank
    }

    /// Judge and drop the buffered bytes. Mid-line, a UTF-8 sequence cut
    /// off at the end of the buffer is kept for the next pass.
    fn scan(&mut self, end_of_line: bool) {
        let keep = if end_of_line || self.non_blank {
            0
        } else {
            incomplete_utf8_tail(&self.pending)
        };
        let judged = self.pending.len() - keep;

        if !self.non_blank && !String::from_utf8_lossy(&self.pending[..judged]).trim().is_empty() {
            self.non_blank = true;
        }
        self.pending.drain(..judged);
    }
}

/// Length of a truncated UTF-8 sequence at the end of `bytes`.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Err(e) if e.error_len().is_none() => bytes.len() - e.valid_up_to(),
        _ => 0,
    }
}
