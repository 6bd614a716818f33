//! Incremental consumption of the streaming chat endpoint
//!
//! The backend streams newline-separated records, each blank or of the form
//! `data: <json>` with optional `content` and `error` fields. Chunk
//! boundaries are arbitrary, so records may be split mid-line across reads;
//! [`DeltaParser`] reassembles them with an explicit trailing-fragment
//! buffer instead of ad hoc slicing.

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;

use crate::{Error, Result};

type BodyStream = BoxStream<'static, reqwest::Result<Bytes>>;

/// Line prefix marking a payload record
const DATA_PREFIX: &[u8] = b"data: ";

/// One incremental fragment of an in-flight assistant response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDelta {
    /// Text fragment to append to the rendered response
    pub content: Option<String>,
    /// Error message reported mid-stream by the backend
    pub error: Option<String>,
}

/// Wire form of a stream record
#[derive(Debug, Deserialize)]
struct StreamRecord {
    content: Option<String>,
    error: Option<String>,
}

/// Incremental line-reassembly parser for the stream wire format
///
/// Feed raw chunks with [`push`](Self::push); complete `data: ` lines yield
/// deltas, malformed lines are dropped, and a partial trailing line is
/// retained for the next chunk. Call [`finish`](Self::finish) at stream end
/// to flush a final record that arrived without a trailing newline.
#[derive(Debug, Default)]
pub struct DeltaParser {
    buf: Vec<u8>,
}

impl DeltaParser {
    /// Create an empty parser
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Consume one chunk of bytes, yielding deltas for each complete record
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamDelta> {
        self.buf.extend_from_slice(chunk);

        let mut deltas = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(delta) = parse_line(&line[..line.len() - 1]) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Flush the trailing fragment at stream end
    pub fn finish(&mut self) -> Option<StreamDelta> {
        let rest = std::mem::take(&mut self.buf);
        parse_line(&rest)
    }
}

/// Parse one line; returns `None` for blanks, non-records, and malformed JSON
fn parse_line(line: &[u8]) -> Option<StreamDelta> {
    let line = trim_cr(line);
    let payload = line.strip_prefix(DATA_PREFIX)?;
    let record: StreamRecord = serde_json::from_slice(payload).ok()?;
    Some(StreamDelta {
        content: record.content,
        error: record.error,
    })
}

/// Strip a trailing carriage return (the backend may emit CRLF)
fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Lazy, finite, non-restartable sequence of [`StreamDelta`]s
///
/// Wraps the HTTP response body of the streaming chat endpoint. Content
/// fragments accumulate in arrival order into the full assistant utterance.
pub struct ResponseStream {
    body: Option<BodyStream>,
    parser: DeltaParser,
    pending: std::collections::VecDeque<StreamDelta>,
    full_text: String,
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("parser", &self.parser)
            .field("pending", &self.pending)
            .field("full_text", &self.full_text)
            .finish_non_exhaustive()
    }
}

impl ResponseStream {
    /// Build a stream over an already-validated HTTP response
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the response status is not successful;
    /// the stream fails before yielding any delta.
    pub fn from_response(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "chat stream returned status {status}"
            )));
        }

        Ok(Self {
            body: Some(response.bytes_stream().boxed()),
            parser: DeltaParser::new(),
            pending: std::collections::VecDeque::new(),
            full_text: String::new(),
        })
    }

    /// Next delta, or `None` once the underlying stream has completed
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if reading the body fails mid-stream.
    pub async fn next_delta(&mut self) -> Result<Option<StreamDelta>> {
        loop {
            if let Some(delta) = self.pending.pop_front() {
                if let Some(fragment) = &delta.content {
                    self.full_text.push_str(fragment);
                }
                return Ok(Some(delta));
            }

            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };

            match body.next().await {
                Some(chunk) => {
                    self.pending.extend(self.parser.push(&chunk?));
                }
                None => {
                    // Stream complete: flush any trailing record, then stop
                    self.body = None;
                    self.pending.extend(self.parser.finish());
                }
            }
        }
    }

    /// Concatenation of all content fragments seen so far
    #[must_use]
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Drain the stream to completion, returning the full assistant text
    ///
    /// # Errors
    ///
    /// Returns error if reading the body fails mid-stream.
    pub async fn collect_text(mut self) -> Result<String> {
        while self.next_delta().await?.is_some() {}
        Ok(self.full_text)
    }
}
