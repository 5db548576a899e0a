//! SSE (Server-Sent Events) frame decoder for OpenAI-compatible streams.
//!
//! Buffers raw bytes across network reads and only decodes complete lines,
//! so a multi-byte character split between two reads is never mangled.

use serde_json::Value;

/// One decoded line of a completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// A `data:` line holding a JSON payload.
    Data(Value),
    /// The `data: [DONE]` terminator.
    Done,
    /// A line that is neither a JSON `data:` payload nor a known SSE field.
    Malformed(String),
}

/// SSE stream decoder.
///
/// Handles the `data: {...}` format with `data: [DONE]` termination.
/// `event:`, `id:`, `retry:` and `:` comment lines and empty keep-alive
/// lines are ignored.
///
/// # Example
///
/// ```
/// use llm_extract::backend::sse::{SseDecoder, SseFrame};
///
/// let mut decoder = SseDecoder::new();
/// let data = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\ndata: [DONE]\n\n";
/// let frames = decoder.decode(data);
/// assert_eq!(frames.len(), 2);
/// assert_eq!(frames[1], SseFrame::Done);
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes after the last newline seen. Never holds a complete line.
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Create a new empty SSE decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every frame completed by them.
    ///
    /// An incomplete trailing line stays buffered until a later call (or
    /// [`flush`](Self::flush)) completes it.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        // Only the new bytes can end a line.
        let Some(last) = chunk.iter().rposition(|&b| b == b'\n') else {
            self.buffer.extend_from_slice(chunk);
            return Vec::new();
        };
        let (complete, rest) = chunk.split_at(last + 1);
        let mut lines = std::mem::take(&mut self.buffer);
        lines.extend_from_slice(complete);
        self.buffer.extend_from_slice(rest);

        lines
            .split(|&b| b == b'\n')
            .filter_map(|line| decode_line(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Decode whatever is left once the body has ended.
    pub fn flush(&mut self) -> Vec<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        String::from_utf8_lossy(&rest)
            .lines()
            .filter_map(decode_line)
            .collect()
    }
}

fn decode_line(line: &str) -> Option<SseFrame> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    if ["event:", "id:", "retry:"].iter().any(|f| line.starts_with(f)) {
        return None;
    }

    let Some(data) = line.strip_prefix("data:") else {
        return Some(SseFrame::Malformed(line.to_string()));
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Some(SseFrame::Done);
    }
    match serde_json::from_str::<Value>(data) {
        Ok(value) => Some(SseFrame::Data(value)),
        Err(_) => Some(SseFrame::Malformed(line.to_string())),
    }
}
