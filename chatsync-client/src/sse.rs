//! Incremental `text/event-stream` framing.
//!
//! ```text
//! : comment            ignored
//! event: message       ignored (only data matters)
//! data: {"id": 4,      ┐ joined with '\n'
//! data:  ...}          ┘
//!                      blank line → dispatch
//! ```
//!
//! Chunks may split anywhere, including inside a UTF-8 sequence: bytes are
//! buffered until a full line is available. An event that is still open
//! when the stream ends is discarded. A line longer than the limit is
//! dropped whole, along with the event it belongs to.

use log::warn;

/// Longest line kept by default.
pub const DEFAULT_MAX_LINE: usize = 1 << 20;

#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no line terminator.
    scanned: usize,
    data: Vec<String>,
    max_line: usize,
    /// Skipping the rest of an over-long line.
    overflowed: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            data: Vec::new(),
            max_line: max_line.max(1),
            overflowed: false,
        }
    }

    /// Feed a chunk, returning the data payload of every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|byte| *byte == b'\n') {
            let end = self.scanned + offset;
            if self.overflowed {
                self.overflowed = false;
            } else {
                let line = String::from_utf8_lossy(&self.buffer[start..end]);
                let line = line.strip_suffix('\r').unwrap_or(line.as_ref());
                if let Some(payload) = Self::process_line(&mut self.data, line) {
                    payloads.push(payload);
                }
            }
            start = end + 1;
            self.scanned = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line {
            warn!(
                "event-stream line exceeds {} bytes, dropping it and its event",
                self.max_line
            );
            self.buffer.clear();
            self.scanned = 0;
            self.data.clear();
            self.overflowed = true;
        }
        payloads
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn process_line(data: &mut Vec<String>, line: &str) -> Option<String> {
        if line.is_empty() {
            if data.is_empty() {
                return None;
            }
            let payload = data.join("\n");
            data.clear();
            return Some(payload);
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            data.push(value.to_string());
        }
        None
    }
}
