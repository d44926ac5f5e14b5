//! Incremental SSE (Server-Sent Events) line parser.
//!
//! Feed it text chunks arriving at arbitrary byte boundaries and it yields
//! fully-assembled frames per the
//! [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html).
use memchr::memchr_iter;

/// One complete SSE frame: optional event name plus the joined data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Terminal sentinel used by the OpenAI-style dialects.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE parser with a rolling line buffer.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    read_offset: usize,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw text and append any complete frames to `out`.
    ///
    /// Field semantics:
    /// - `data:` lines append to the data buffer (strip one leading space,
    ///   join multiple lines with `\n`)
    /// - `event:` sets the event name for the next frame
    /// - an empty line dispatches the pending frame
    /// - `:` comment lines and unknown fields are ignored
    pub fn feed(&mut self, chunk: &str, out: &mut Vec<SseFrame>) {
        self.buffer.push_str(chunk);
        let mut consumed = self.read_offset;
        let scan_start = self.read_offset;
        let bytes = self.buffer.as_bytes();

        for rel in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel;
            let mut line = &self.buffer[consumed..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(
                line,
                &mut self.event_type,
                &mut self.data_buffer,
                &mut self.has_data,
                out,
            );
            consumed = line_end + 1;
        }

        self.read_offset = consumed;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
        } else if self.read_offset >= 8 * 1024 {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    fn process_line(
        line: &str,
        event_type: &mut Option<String>,
        data_buffer: &mut String,
        has_data: &mut bool,
        out: &mut Vec<SseFrame>,
    ) {
        if line.is_empty() {
            if *has_data {
                out.push(SseFrame {
                    event: event_type.take(),
                    data: std::mem::take(data_buffer),
                });
                *has_data = false;
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if *has_data {
                data_buffer.push('\n');
            } else {
                *has_data = true;
            }
            data_buffer.push_str(value);
        } else if let Some(value) = line.strip_prefix("event:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            *event_type = Some(value.to_string());
        }
        // id:/retry:/unknown fields carry nothing we surface
    }

    /// Dispatch any frame still pending when the stream ends without a
    /// trailing blank line (some vendors close the connection mid-frame).
    pub fn finish(&mut self, out: &mut Vec<SseFrame>) {
        let tail = self.buffer[self.read_offset..].trim_end_matches('\r').to_owned();
        if !tail.is_empty() {
            Self::process_line(
                &tail,
                &mut self.event_type,
                &mut self.data_buffer,
                &mut self.has_data,
                out,
            );
        }
        self.buffer.clear();
        self.read_offset = 0;
        if self.has_data {
            out.push(SseFrame {
                event: self.event_type.take(),
                data: std::mem::take(&mut self.data_buffer),
            });
            self.has_data = false;
        }
    }
}
