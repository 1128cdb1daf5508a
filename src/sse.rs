//! Shared Server-Sent Events parser used by every provider adapter.
//!
//! Implements the line/field parsing algorithm from the W3C EventSource
//! specification: CR, LF, and CRLF are all recognized line terminators, lines
//! starting with `:` are comments, `data:` fields accumulate across multiple
//! lines joined by `\n`, and an event dispatches only when a blank line is
//! seen and at least one `data:` field has been collected since the last
//! dispatch.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::error::LLMError;
use crate::http::HttpBodyStream;

/// A single parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// Value of the `event:` field, or `"message"` when absent.
    pub event: String,
    /// Accumulated `data:` payload, lines joined by `\n`.
    pub data: String,
    /// Last seen `id:` field, carried across events per the spec.
    pub id: Option<String>,
    /// Parsed `retry:` field in milliseconds, when present and well-formed.
    pub retry: Option<u64>,
}

/// Decodes a raw byte stream into [`SseEvent`] values.
pub struct SseDecoder {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    event_type: Option<String>,
    data_lines: Vec<String>,
    last_id: Option<String>,
    retry: Option<u64>,
    saw_field_since_dispatch: bool,
    pending: VecDeque<Result<SseEvent, LLMError>>,
    provider: &'static str,
    stream_closed: bool,
    finished: bool,
}

impl SseDecoder {
    pub fn new(body: HttpBodyStream, provider: &'static str) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            event_type: None,
            data_lines: Vec::new(),
            last_id: None,
            retry: None,
            saw_field_since_dispatch: false,
            pending: VecDeque::new(),
            provider,
            stream_closed: false,
            finished: false,
        }
    }

    fn handle_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }
        if line.starts_with(':') {
            // Comment line: counts as "seen" but contributes no field.
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };

        self.saw_field_since_dispatch = true;
        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(ms) = value.trim().parse::<u64>() {
                    self.retry = Some(ms);
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) {
        if self.data_lines.is_empty() {
            self.event_type = None;
            self.saw_field_since_dispatch = false;
            return;
        }
        let data = self.data_lines.join("\n");
        let event = SseEvent {
            event: self.event_type.take().unwrap_or_else(|| "message".to_string()),
            data,
            id: self.last_id.take(),
            retry: self.retry.take(),
        };
        self.data_lines.clear();
        self.saw_field_since_dispatch = false;
        self.pending.push_back(Ok(event));
    }

    /// Flushes any event buffered but not yet dispatched by a trailing blank
    /// line, as happens at end of stream.
    fn flush_final(&mut self) {
        if !self.data_lines.is_empty() {
            self.dispatch();
        }
    }

    fn drain_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
        let mut cr_pos = None;
        let mut lf_pos = None;
        for (idx, byte) in buffer.iter().enumerate() {
            match *byte {
                b'\n' => {
                    lf_pos = Some(idx);
                    break;
                }
                b'\r' => {
                    cr_pos = Some(idx);
                    break;
                }
                _ => {}
            }
        }

        match (cr_pos, lf_pos) {
            (Some(cr), None) => {
                // Bare CR, or CRLF if a LF immediately follows (not yet buffered).
                if cr + 1 == buffer.len() {
                    return None; // need to see whether the next byte is \n
                }
                let mut consume = cr + 1;
                if buffer.get(cr + 1) == Some(&b'\n') {
                    consume += 1;
                }
                let line: Vec<u8> = buffer.drain(..consume).collect();
                Some(line[..cr].to_vec())
            }
            (None, Some(lf)) => {
                let line: Vec<u8> = buffer.drain(..=lf).collect();
                let end = if line.len() >= 2 && line[line.len() - 2] == b'\r' {
                    line.len() - 2
                } else {
                    line.len() - 1
                };
                Some(line[..end].to_vec())
            }
            _ => None,
        }
    }
}

impl Stream for SseDecoder {
    type Item = Result<SseEvent, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(event) = this.pending.pop_front() {
            return Poll::Ready(Some(event));
        }
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            if this.stream_closed {
                if !this.buffer.is_empty() {
                    let remaining = std::mem::take(&mut this.buffer);
                    match String::from_utf8(remaining) {
                        Ok(text) => {
                            for line in text.split(['\n']) {
                                this.handle_line(line.trim_end_matches('\r'));
                            }
                        }
                        Err(err) => {
                            this.finished = true;
                            return Poll::Ready(Some(Err(LLMError::Stream {
                                message: format!("invalid UTF-8 in SSE stream ({}): {err}", this.provider),
                            })));
                        }
                    }
                }
                this.flush_final();
                this.finished = true;
                return this
                    .pending
                    .pop_front()
                    .map_or(Poll::Ready(None), |event| Poll::Ready(Some(event)));
            }

            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    while let Some(line) = Self::drain_line(&mut this.buffer) {
                        match std::str::from_utf8(&line) {
                            Ok(text) => this.handle_line(text),
                            Err(err) => {
                                this.finished = true;
                                return Poll::Ready(Some(Err(LLMError::Stream {
                                    message: format!(
                                        "invalid UTF-8 in SSE stream ({}): {err}",
                                        this.provider
                                    ),
                                })));
                            }
                        }
                        if let Some(event) = this.pending.pop_front() {
                            return Poll::Ready(Some(event));
                        }
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.stream_closed = true;
                    continue;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
