//! Server-sent-events stream reader
//!
//! Turns the chat endpoint's byte stream into ordered text deltas. Frames are
//! `data: <payload>` lines grouped into events by a blank line. A payload is
//! either a completion chunk (`choices[0].delta.content`), the `[DONE]`
//! sentinel, or arbitrary text that is passed through as a literal delta.

use futures::{Stream, StreamExt};

use crate::LlmError;

const DONE_SENTINEL: &str = "[DONE]";
const CONTENT_POINTER: &str = "/choices/0/delta/content";

/// One decoded unit of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// New text since the previous delta
    Delta(String),
    /// The server sent `[DONE]`; nothing after it is decoded
    Done,
}

/// Incremental SSE decoder
///
/// Bytes may be split anywhere, including inside a UTF-8 sequence or a
/// `\r\n` pair. Once `[DONE]` is seen the decoder ignores all further input.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
    /// Decoded text of the line currently being received
    line: String,
    /// Complete lines of the event currently being received
    event: Vec<String>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decode the next chunk of bytes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        if self.done {
            return frames;
        }

        let text = self.decode_utf8(chunk);
        for ch in text.chars() {
            if ch != '\n' {
                self.line.push(ch);
                continue;
            }

            let mut line = std::mem::take(&mut self.line);
            if line.ends_with('\r') {
                line.pop();
            }

            if line.is_empty() {
                self.dispatch_event(&mut frames);
                if self.done {
                    self.pending.clear();
                    return frames;
                }
            } else {
                self.event.push(line);
            }
        }

        frames
    }

    /// Decode whatever is left once the byte stream has ended
    ///
    /// An unterminated final event is parsed with the same rules as a
    /// complete one.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        if self.done {
            return frames;
        }

        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.line.push_str(&tail);
        }

        let line = std::mem::take(&mut self.line);
        if !line.is_empty() {
            self.event.push(line);
        }
        self.dispatch_event(&mut frames);
        frames
    }

    /// Append `chunk` to the pending bytes and return the complete UTF-8
    /// prefix. Invalid sequences become U+FFFD.
    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                    break;
                },
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    // valid_up_to guarantees this slice is valid UTF-8
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        },
                        None => {
                            // incomplete sequence at the end, wait for more bytes
                            start = valid_end;
                            break;
                        },
                    }
                },
            }
        }

        self.pending.drain(..start);
        out
    }

    fn dispatch_event(&mut self, frames: &mut Vec<SseFrame>) {
        for line in std::mem::take(&mut self.event) {
            match parse_line(&line) {
                LineKind::Ignored => {},
                LineKind::Delta(delta) => frames.push(SseFrame::Delta(delta)),
                LineKind::Done => {
                    self.done = true;
                    self.line.clear();
                    frames.push(SseFrame::Done);
                    return;
                },
            }
        }
    }
}

enum LineKind {
    Ignored,
    Delta(String),
    Done,
}

fn parse_line(line: &str) -> LineKind {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return LineKind::Ignored;
    }

    let Some(payload) = line.strip_prefix("data:") else {
        return LineKind::Ignored;
    };
    let payload = payload.trim();

    if payload == DONE_SENTINEL {
        return LineKind::Done;
    }

    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => match value.pointer(CONTENT_POINTER).and_then(|v| v.as_str()) {
            Some(content) if !content.is_empty() => LineKind::Delta(content.to_string()),
            _ => LineKind::Ignored,
        },
        // Non-conforming servers send bare text; keep it rather than drop it
        Err(_) if !payload.is_empty() => LineKind::Delta(payload.to_string()),
        Err(_) => LineKind::Ignored,
    }
}

/// Read an SSE byte stream to completion
///
/// Every delta is passed to `on_delta` in arrival order and appended to the
/// returned text. Stops at `[DONE]` without polling the stream again. Read
/// errors propagate; the text accumulated so far is dropped with them.
pub async fn read_sse_stream<S, B, E, F>(stream: S, mut on_delta: F) -> Result<String, LlmError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<LlmError>,
    F: FnMut(&str),
{
    futures::pin_mut!(stream);

    let mut decoder = SseDecoder::new();
    let mut text = String::new();
    let mut deltas = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::into)?;
        for frame in decoder.feed(chunk.as_ref()) {
            match frame {
                SseFrame::Delta(delta) => {
                    deltas += 1;
                    text.push_str(&delta);
                    on_delta(&delta);
                },
                SseFrame::Done => {
                    tracing::debug!(deltas, chars = text.len(), "SSE stream finished with [DONE]");
                    return Ok(text);
                },
            }
        }
    }

    for frame in decoder.finish() {
        if let SseFrame::Delta(delta) = frame {
            deltas += 1;
            text.push_str(&delta);
            on_delta(&delta);
        }
    }

    tracing::debug!(deltas, chars = text.len(), "SSE stream closed");
    Ok(text)
}
