//! SSE token decoder for streaming chat completions.
//!
//! The provider frames its stream as newline-delimited `data: <json>` lines and
//! ends it with `data: [DONE]`. The decoder turns the raw byte stream into a lazy
//! sequence of text fragments, one per non-empty `choices[0].delta.content`.
//!
//! A malformed frame yields a non-terminal [`DecodeError`] and decoding carries on
//! with the next line. An oversized line or a failing byte stream is terminal.
//! End of stream without the sentinel is a normal completion.

use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::llm::error::DecodeError;
use crate::llm::types::ByteStream;

/// Event-data marker.
pub const DATA_PREFIX: &[u8] = b"data:";

/// Payload that ends the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Deserialize)]
struct ChunkPayload {
    choices: Option<Vec<ChunkChoice>>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

enum Line {
    Skip,
    Fragment(String),
    Done,
    Error(DecodeError),
}

/// Lazy, single-pass decoder over an upstream byte stream.
pub struct SseTokenDecoder {
    inner: ByteStream,
    buffer: BytesMut,
    // Bytes of `buffer` already known not to contain a newline.
    scanned: usize,
    max_line_bytes: usize,
    line_no: usize,
    eof: bool,
    finished: bool,
}

impl SseTokenDecoder {
    /// Wrap a byte stream; lines longer than `max_line_bytes` are fatal.
    #[must_use]
    pub fn new(inner: ByteStream, max_line_bytes: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            scanned: 0,
            max_line_bytes,
            line_no: 0,
            eof: false,
            finished: false,
        }
    }

    /// Number of lines consumed so far.
    #[must_use]
    pub const fn lines_read(&self) -> usize {
        self.line_no
    }

    /// Next fragment or per-frame error; `None` once the sequence is over.
    ///
    /// After a terminal error, every later call returns `None`.
    pub async fn next_fragment(&mut self) -> Option<Result<String, DecodeError>> {
        while !self.finished {
            let Some(line) = self.next_line().await else {
                self.finished = true;
                break;
            };
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            };

            match self.decode_line(&line) {
                Line::Skip => {}
                Line::Fragment(text) => return Some(Ok(text)),
                Line::Done => self.finished = true,
                Line::Error(err) => return Some(Err(err)),
            }
        }
        None
    }

    /// Turn the decoder into a `Stream` of fragments.
    pub fn into_stream(self) -> impl Stream<Item = Result<String, DecodeError>> + Send {
        futures::stream::unfold(self, |mut decoder| async move {
            decoder.next_fragment().await.map(|item| (item, decoder))
        })
    }

    async fn next_line(&mut self) -> Option<Result<BytesMut, DecodeError>> {
        loop {
            if let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
                let end = self.scanned + offset;
                self.scanned = 0;
                if end > self.max_line_bytes {
                    return Some(Err(self.too_large()));
                }
                let mut line = self.buffer.split_to(end);
                self.buffer.advance(1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                self.line_no += 1;
                return Some(Ok(line));
            }
            self.scanned = self.buffer.len();

            if self.buffer.len() > self.max_line_bytes {
                return Some(Err(self.too_large()));
            }

            if self.eof {
                if self.buffer.is_empty() {
                    return None;
                }
                // Trailing line without a newline.
                let mut line = self.buffer.split();
                self.scanned = 0;
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                self.line_no += 1;
                return Some(Ok(line));
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => return Some(Err(DecodeError::Upstream(err))),
                None => self.eof = true,
            }
        }
    }

    const fn too_large(&self) -> DecodeError {
        DecodeError::FrameTooLarge {
            limit: self.max_line_bytes,
        }
    }

    fn decode_line(&self, line: &[u8]) -> Line {
        let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
            return Line::Skip;
        };
        let Ok(payload) = std::str::from_utf8(rest) else {
            return Line::Error(DecodeError::InvalidUtf8 { line: self.line_no });
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return Line::Skip;
        }
        if payload == DONE_SENTINEL {
            return Line::Done;
        }

        match serde_json::from_str::<ChunkPayload>(payload) {
            Ok(chunk) => chunk
                .choices
                .and_then(|choices| choices.into_iter().next())
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content)
                .filter(|content| !content.is_empty())
                .map_or(Line::Skip, Line::Fragment),
            Err(source) => Line::Error(DecodeError::MalformedFrame {
                line: self.line_no,
                source,
            }),
        }
    }
}
