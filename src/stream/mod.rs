//! Frame decoding: arbitrarily-chunked bytes in, complete JSON frames out.
//!
//! Two framing dialects hide behind one interface. `SsePrefix` carries one
//! JSON payload per `data:` frame with an optional `[DONE]` sentinel;
//! `JsonStream` is a raw concatenation (or array) of JSON objects with
//! completion signalled in-band, extracted with a string-aware scanner.

pub mod sse;

use serde_json::Value;

use crate::json_scan;
use self::sse::{SseFrame, SseParser};

/// Wire framing style a vendor stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `data: {json}\n\n` frames, optionally preceded by `event:` lines.
    SsePrefix,
    /// Concatenated or array-wrapped JSON objects, no line framing.
    JsonStream,
}

/// One decoded frame handed to the vendor adapter.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// SSE event name, where the dialect carries one (Anthropic).
    pub event: Option<String>,
    pub json: Value,
}

/// Rolling-buffer decoder for one streaming response.
///
/// Invalid UTF-8 never aborts decoding: incomplete multi-byte suffixes are
/// carried into the next chunk, and genuinely invalid sequences are replaced.
/// A frame that fails to parse as JSON is skipped without discarding the
/// unconsumed buffer tail.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    sse: SseParser,
    sse_frames: Vec<SseFrame>,
    text: String,
    text_offset: usize,
    utf8_carry: Vec<u8>,
    done: bool,
}

impl FrameDecoder {
    #[must_use]
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            sse: SseParser::new(),
            sse_frames: Vec::new(),
            text: String::new(),
            text_offset: 0,
            utf8_carry: Vec::new(),
            done: false,
        }
    }

    /// Whether the stream's terminal sentinel has been observed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume one inbound chunk and return the complete frames it finishes.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<RawFrame>) {
        if self.done {
            return;
        }
        let text = self.decode_utf8(chunk);
        match self.framing {
            Framing::SsePrefix => self.feed_sse(&text, out),
            Framing::JsonStream => self.feed_json_stream(&text, out),
        }
    }

    /// Signal end of stream; flushes any unterminated SSE frame.
    pub fn finish(&mut self, out: &mut Vec<RawFrame>) {
        if self.done {
            return;
        }
        if self.framing == Framing::SsePrefix {
            self.sse_frames.clear();
            self.sse.finish(&mut self.sse_frames);
            let frames = std::mem::take(&mut self.sse_frames);
            self.dispatch_sse_frames(frames, out);
        }
        self.done = true;
    }

    /// Decode a chunk to text, carrying incomplete multi-byte suffixes and
    /// replacing invalid sequences so corrupt input never crashes parsing.
    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        let bytes: &[u8];
        let joined: Vec<u8>;
        if self.utf8_carry.is_empty() {
            bytes = chunk;
        } else {
            joined = {
                let mut v = std::mem::take(&mut self.utf8_carry);
                v.extend_from_slice(chunk);
                v
            };
            bytes = &joined;
        }

        let mut text = String::with_capacity(bytes.len());
        let mut rest = bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    // Safety: valid_up_to is a guaranteed UTF-8 boundary.
                    text.push_str(unsafe {
                        std::str::from_utf8_unchecked(&rest[..valid_up_to])
                    });
                    match err.error_len() {
                        Some(bad) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid_up_to + bad..];
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            self.utf8_carry.extend_from_slice(&rest[valid_up_to..]);
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    fn feed_sse(&mut self, text: &str, out: &mut Vec<RawFrame>) {
        self.sse_frames.clear();
        self.sse.feed(text, &mut self.sse_frames);
        let frames = std::mem::take(&mut self.sse_frames);
        self.dispatch_sse_frames(frames, out);
    }

    fn dispatch_sse_frames(&mut self, frames: Vec<SseFrame>, out: &mut Vec<RawFrame>) {
        for frame in frames {
            if self.done {
                return;
            }
            if frame.is_done() {
                self.done = true;
                return;
            }
            match serde_json::from_str::<Value>(&frame.data) {
                Ok(json) => out.push(RawFrame {
                    event: frame.event,
                    json,
                }),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unparseable SSE frame");
                }
            }
        }
    }

    fn feed_json_stream(&mut self, text: &str, out: &mut Vec<RawFrame>) {
        self.text.push_str(text);

        loop {
            let bytes = self.text.as_bytes();
            let mut i = json_scan::skip_ws(bytes, self.text_offset);
            // Array wrapping and separators are structural noise here.
            while matches!(bytes.get(i), Some(b'[' | b',' | b']')) {
                i = json_scan::skip_ws(bytes, i + 1);
            }
            let Some(end) = json_scan::value_end(bytes, i) else {
                // Incomplete value: retain the tail for the next chunk.
                self.text_offset = i;
                break;
            };

            match serde_json::from_str::<Value>(&self.text[i..end]) {
                Ok(json) => out.push(RawFrame { event: None, json }),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unparseable stream value");
                }
            }
            self.text_offset = end;
        }

        if self.text_offset >= 8 * 1024 {
            self.text.drain(..self.text_offset);
            self.text_offset = 0;
        }
    }
}
