//! Two-state framing for the mixed text/binary wire protocol
//!
//! The stream alternates between line-oriented text and exact-length raw
//! binary:
//!
//! ```text
//! <text line>\n<text line>\n/sendfile @bob report.txt 5\nHELLO<text line>\n...
//!                                                       ^^^^^ 5 raw bytes
//! ```
//!
//! The framer starts in LINE mode and stays there until the router accepts a
//! file-transfer header and calls [`Framer::begin_binary`]. In BINARY mode it
//! hands out up to the declared number of raw bytes (any byte values,
//! terminators included) and flips back to LINE mode once the declared length
//! has been consumed. Bytes beyond the declared length stay buffered and are
//! decoded as the next text line.

use bytes::{Bytes, BytesMut};
use std::io;

/// Maximum accepted length of a single text line, terminator included
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Decoding state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Scanning for `\n`-terminated text lines
    Line,
    /// Consuming the remaining bytes of a binary payload
    Binary { remaining: u64 },
}

/// A decoded protocol unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    /// A complete text line, terminator stripped and whitespace trimmed
    Line(String),
    /// A slice of an in-progress binary payload; `complete` marks the final
    /// chunk (possibly empty, for zero-length transfers)
    FilePayload { data: Bytes, complete: bool },
}

/// Streaming decoder over a connection's inbound bytes
#[derive(Debug)]
pub struct Framer {
    buffer: BytesMut,
    mode: Mode,
}

impl Framer {
    /// Create a new framer in LINE mode
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            mode: Mode::Line,
        }
    }

    /// Feed raw bytes from the transport
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Switch to BINARY mode for the next `length` bytes.
    ///
    /// Callers must only do this from LINE mode, after the router accepted a
    /// file-transfer header.
    pub fn begin_binary(&mut self, length: u64) {
        debug_assert_eq!(self.mode, Mode::Line);
        self.mode = Mode::Binary { remaining: length };
    }

    /// Whether the framer is mid-transfer
    pub fn in_binary_mode(&self) -> bool {
        matches!(self.mode, Mode::Binary { .. })
    }

    /// Number of bytes buffered but not yet decoded
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Try to decode the next unit.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Call repeatedly after
    /// each [`feed`](Self::feed) until it returns `None`; a single read can
    /// carry several lines, or the tail of a payload plus the next line.
    pub fn decode_next(&mut self) -> io::Result<Option<Unit>> {
        match self.mode {
            Mode::Line => self.decode_line(),
            Mode::Binary { remaining } => Ok(self.decode_payload(remaining)),
        }
    }

    fn decode_line(&mut self) -> io::Result<Option<Unit>> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let line = self.buffer.split_to(pos + 1);
                let text = String::from_utf8_lossy(&line[..pos]);
                Ok(Some(Unit::Line(text.trim().to_string())))
            }
            None if self.buffer.len() > MAX_LINE_LEN => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "line exceeds {} bytes without a terminator",
                    MAX_LINE_LEN
                ),
            )),
            None => Ok(None),
        }
    }

    fn decode_payload(&mut self, remaining: u64) -> Option<Unit> {
        if remaining == 0 {
            // Zero-length transfer: complete without consuming anything.
            self.mode = Mode::Line;
            return Some(Unit::FilePayload {
                data: Bytes::new(),
                complete: true,
            });
        }

        if self.buffer.is_empty() {
            return None;
        }

        let take = (self.buffer.len() as u64).min(remaining) as usize;
        let data = self.buffer.split_to(take).freeze();
        let left = remaining - take as u64;

        if left == 0 {
            self.mode = Mode::Line;
        } else {
            self.mode = Mode::Binary { remaining: left };
        }

        Some(Unit::FilePayload {
            data,
            complete: left == 0,
        })
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}
