//! Incremental frame extraction from a raw output stream
//!
//! Tool-server stdout is an unstructured text stream: protocol frames are
//! usually newline-delimited JSON, but servers also write plain log noise to
//! stdout, split frames across writes, or omit the trailing newline. The
//! extractor turns appended chunks into complete [`JsonRpcMessage`] values
//! and keeps everything unparseable buffered (up to a cap) until more data
//! arrives.

use crate::protocol::JsonRpcMessage;
use serde_json::Value;

/// Default upper bound on buffered bytes
///
/// A server that never emits a valid frame must not grow memory without
/// bound; past the cap the oldest bytes are discarded.
pub const DEFAULT_BUFFER_CAP: usize = 1024 * 1024;

/// Growing buffer over a stream of text chunks
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: String,
    cap: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_BUFFER_CAP)
    }

    /// Create a buffer with a custom byte cap
    pub fn with_cap(cap: usize) -> Self {
        Self {
            buffer: String::new(),
            cap,
        }
    }

    /// Append a chunk and drain every complete frame it unlocks
    pub fn push(&mut self, chunk: &str) -> Vec<JsonRpcMessage> {
        self.buffer.push_str(chunk);
        let messages = drain_frames(&mut self.buffer);
        self.enforce_cap();
        messages
    }

    /// Bytes currently buffered awaiting more data
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn enforce_cap(&mut self) {
        if self.buffer.len() <= self.cap {
            return;
        }
        let mut cut = self.buffer.len() - self.cap;
        while !self.buffer.is_char_boundary(cut) {
            cut += 1;
        }
        tracing::warn!(
            "Frame buffer exceeded {} bytes; discarding {} oldest bytes",
            self.cap,
            cut
        );
        self.buffer.drain(..cut);
    }
}

/// Drain complete frames out of `buffer`, leaving any unparsed tail in place.
///
/// Pure over the buffer contents: no I/O, independently testable.
///
/// Two passes per call:
/// 1. Fast path: complete lines. Each line is trimmed and parsed; lines that
///    are not protocol frames are log noise and dropped silently.
/// 2. Fallback: JSON that is not newline-delimited. From the first `{`, retry
///    the parse with a growing end index until it succeeds or input runs out.
pub fn drain_frames(buffer: &mut String) -> Vec<JsonRpcMessage> {
    let mut messages = Vec::new();

    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_frame(trimmed) {
            Some(msg) => messages.push(msg),
            None => {
                tracing::debug!("Discarding non-protocol stdout line: {}", truncated(trimmed))
            }
        }
    }

    while let Some((frame, consumed)) = scan_unterminated(buffer) {
        buffer.drain(..consumed);
        if let Some(msg) = frame {
            messages.push(msg);
        }
    }

    messages
}

/// Attempt one fallback parse over the (newline-free) buffer tail.
///
/// Returns the parsed frame (`None` inside the tuple when the span was valid
/// JSON but not a protocol frame) and the byte offset consumed, or `None`
/// when nothing parses yet and the tail should stay buffered.
fn scan_unterminated(buffer: &str) -> Option<(Option<JsonRpcMessage>, usize)> {
    let start = buffer.find('{')?;
    let tail = &buffer[start..];

    let ends = tail
        .char_indices()
        .skip(1)
        .map(|(i, _)| i)
        .chain(std::iter::once(tail.len()));

    for end in ends {
        let candidate = &tail[..end];
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            // Junk before the opening brace is consumed along with the span
            return Some((classify(value), start + end));
        }
    }

    None
}

/// Parse one candidate line into a protocol frame
fn parse_frame(line: &str) -> Option<JsonRpcMessage> {
    let value = serde_json::from_str::<Value>(line).ok()?;
    classify(value)
}

/// Accept only values carrying the protocol marker and a valid message shape
fn classify(value: Value) -> Option<JsonRpcMessage> {
    if value.get("jsonrpc").is_none() {
        return None;
    }
    serde_json::from_value::<JsonRpcMessage>(value).ok()
}

fn truncated(line: &str) -> &str {
    let mut end = line.len().min(120);
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
