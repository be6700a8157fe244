//! Incremental `text/event-stream` decoder.

use status_core::TransportEvent;

use crate::error::TransportError;

/// Event name the health endpoint uses for heartbeats.
pub const HEARTBEAT_EVENT: &str = "ping";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, `None` for unnamed `message` events.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

impl SseFrame {
    pub fn is_heartbeat(&self) -> bool {
        self.event.as_deref() == Some(HEARTBEAT_EVENT)
    }

    /// Both kinds count as liveness; only the heartbeat is named.
    pub fn transport_event(&self) -> TransportEvent {
        if self.is_heartbeat() {
            TransportEvent::Heartbeat
        } else {
            TransportEvent::Message
        }
    }
}

/// Largest pending line or event body the decoder buffers.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Splits arbitrary byte chunks into [`SseFrame`]s.
///
/// Lines end in CR, LF or CRLF. A CR that ends one chunk swallows an LF
/// that starts the next.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no line terminator.
    scanned: usize,
    skip_lf: bool,
    event: Option<String>,
    data: Vec<String>,
    data_len: usize,
    limit: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_FRAME_BYTES)
    }
}

impl SseDecoder {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            skip_lf: false,
            event: None,
            data: Vec::new(),
            data_len: 0,
            limit,
        }
    }

    /// Feed one chunk and return every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, TransportError> {
        let mut chunk = chunk;
        if self.skip_lf && !chunk.is_empty() {
            self.skip_lf = false;
            if chunk[0] == b'\n' {
                chunk = &chunk[1..];
            }
        }
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut line_start = 0;
        while let Some(offset) = self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
        {
            let line_end = self.scanned + offset;
            let mut next = line_end + 1;
            if self.buffer[line_end] == b'\r' {
                match self.buffer.get(next) {
                    Some(b'\n') => next += 1,
                    Some(_) => {}
                    None => self.skip_lf = true,
                }
            }

            let line = String::from_utf8_lossy(&self.buffer[line_start..line_end]).into_owned();
            if let Some(frame) = self.process_line(&line)? {
                frames.push(frame);
            }
            line_start = next;
            self.scanned = next;
        }

        self.buffer.drain(..line_start);
        self.scanned = self.buffer.len();
        if self.buffer.len() > self.limit {
            return Err(TransportError::FrameTooLarge { limit: self.limit });
        }
        Ok(frames)
    }

    fn process_line(&mut self, line: &str) -> Result<Option<SseFrame>, TransportError> {
        if line.is_empty() {
            return Ok(self.dispatch());
        }
        if line.starts_with(':') {
            return Ok(None);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => {
                self.data_len += value.len() + 1;
                if self.data_len > self.limit {
                    return Err(TransportError::FrameTooLarge { limit: self.limit });
                }
                self.data.push(value.to_owned());
            }
            // `id` and `retry` do not affect liveness.
            _ => {}
        }
        Ok(None)
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take().filter(|name| !name.is_empty());
        self.data_len = 0;
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}
