//! Shared event-stream plumbing.
//!
//! Vendors emit different `text/event-stream` shapes. Each adapter supplies a
//! [`StreamParser`] for its line format; [`read_event_stream`] owns the byte
//! buffering, cancellation, idle timeout and the single completion signal, so
//! every vendor reports `on_chunk("", true)` exactly once per stream.

use std::fmt::Display;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use memchr::memchr;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::ChatError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetadata {
    pub model: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Receiver of normalized stream output.
pub trait StreamSink: Send {
    /// A text delta. `is_done` is set exactly once, with an empty delta.
    fn on_chunk(&mut self, delta: &str, is_done: bool);

    fn on_metadata(&mut self, metadata: StreamMetadata);
}

/// Collects everything in memory.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectingSink {
    pub deltas: Vec<String>,
    pub done_signals: usize,
    pub metadata: Vec<StreamMetadata>,
}

impl CollectingSink {
    pub fn content(&self) -> String {
        self.deltas.concat()
    }
}

impl StreamSink for CollectingSink {
    fn on_chunk(&mut self, delta: &str, is_done: bool) {
        if is_done {
            self.done_signals += 1;
        } else {
            self.deltas.push(delta.to_string());
        }
    }

    fn on_metadata(&mut self, metadata: StreamMetadata) {
        self.metadata.push(metadata);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Finished,
}

/// Vendor-specific interpretation of one stream line.
///
/// Returning `Err` aborts the stream. Lines that merely fail to parse should
/// be logged and answered with `Ok(LineOutcome::Continue)`.
pub trait StreamParser: Send {
    fn parse_line(
        &mut self,
        line: &str,
        sink: &mut dyn StreamSink,
    ) -> Result<LineOutcome, ChatError>;
}

/// Payload of an SSE `data:` line, with or without the space.
pub fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Error message embedded in a JSON payload, if any.
pub fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Reduce an API error body to one readable line.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "<empty response body>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value) {
            if !summary.is_empty() {
                return summary;
            }
        }
        if let Some(message) = json_value.get("message").and_then(|v| v.as_str()) {
            return message.to_string();
        }
        return json_value.to_string();
    }

    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drive a byte stream through a parser until it finishes.
///
/// * Lines are split on `\n`; invalid UTF-8 lines are logged and skipped.
/// * A parser error stops reading and is returned.
/// * Clean end of input counts as completion.
/// * Cancellation stops reading silently without a completion signal.
/// * `idle_timeout` bounds the wait for each read.
pub async fn read_event_stream<S, B, E>(
    mut stream: S,
    parser: &mut dyn StreamParser,
    sink: &mut dyn StreamSink,
    cancel: &CancellationToken,
    idle_timeout: Duration,
) -> Result<(), ChatError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("stream cancelled by caller");
                return Ok(());
            }
            next = tokio::time::timeout(idle_timeout, stream.next()) => next,
        };

        let chunk = match next {
            Err(_) => return Err(ChatError::Timeout(idle_timeout)),
            Ok(None) => break,
            Ok(Some(Err(err))) => return Err(ChatError::network(None, err.to_string())),
            Ok(Some(Ok(bytes))) => bytes,
        };
        buffer.extend_from_slice(chunk.as_ref());

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let outcome = match std::str::from_utf8(&buffer[..newline_pos]) {
                Ok(line) => dispatch_line(line, parser, sink)?,
                Err(err) => {
                    warn!(error = %err, "skipping invalid UTF-8 in stream");
                    LineOutcome::Continue
                }
            };
            buffer.drain(..=newline_pos);
            if outcome == LineOutcome::Finished {
                sink.on_chunk("", true);
                return Ok(());
            }
        }
    }

    // Trailing line without a newline.
    if let Ok(line) = std::str::from_utf8(&buffer) {
        if dispatch_line(line, parser, sink)? == LineOutcome::Finished {
            sink.on_chunk("", true);
            return Ok(());
        }
    }

    debug!("stream ended without a termination event");
    sink.on_chunk("", true);
    Ok(())
}

fn dispatch_line(
    line: &str,
    parser: &mut dyn StreamParser,
    sink: &mut dyn StreamSink,
) -> Result<LineOutcome, ChatError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(LineOutcome::Continue);
    }
    match parser.parse_line(line, sink) {
        Err(err) if err.is_recoverable() => {
            warn!(error = %err, "skipping unparseable stream line");
            Ok(LineOutcome::Continue)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    /// Treats `data: <text>` as a delta and `data: END` as completion.
    struct EchoParser;

    impl StreamParser for EchoParser {
        fn parse_line(
            &mut self,
            line: &str,
            sink: &mut dyn StreamSink,
        ) -> Result<LineOutcome, ChatError> {
            match extract_data_payload(line) {
                Some("END") => Ok(LineOutcome::Finished),
                Some("BOOM") => Err(ChatError::StreamAbort("boom".into())),
                Some("GARBAGE") => Err(ChatError::ProtocolParse("garbage".into())),
                Some(text) => {
                    sink.on_chunk(text, false);
                    Ok(LineOutcome::Continue)
                }
                None => Ok(LineOutcome::Continue),
            }
        }
    }

    fn byte_stream(
        parts: Vec<&'static str>,
    ) -> impl Stream<Item = Result<Vec<u8>, String>> + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(p.as_bytes().to_vec())))
    }

    async fn run(parts: Vec<&'static str>) -> (Result<(), ChatError>, CollectingSink) {
        let mut sink = CollectingSink::default();
        let result = read_event_stream(
            byte_stream(parts),
            &mut EchoParser,
            &mut sink,
            &CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await;
        (result, sink)
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let (result, sink) = run(vec!["data: 你", "\ndata:", " 好\n", "data: END\n"]).await;
        assert!(result.is_ok());
        assert_eq!(sink.deltas, vec!["你", "好"]);
        assert_eq!(sink.done_signals, 1);
    }

    #[tokio::test]
    async fn multibyte_characters_split_across_chunks_survive() {
        let bytes = "data: 你好\n".as_bytes();
        let (head, tail) = bytes.split_at(8);
        let parts = vec![Ok::<_, String>(head.to_vec()), Ok(tail.to_vec())];
        let mut sink = CollectingSink::default();
        read_event_stream(
            stream::iter(parts),
            &mut EchoParser,
            &mut sink,
            &CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await
        .expect("stream");
        assert_eq!(sink.content(), "你好");
    }

    #[tokio::test]
    async fn eof_without_sentinel_still_signals_done_once() {
        let (result, sink) = run(vec!["data: a\n", "data: b"]).await;
        assert!(result.is_ok());
        assert_eq!(sink.content(), "ab");
        assert_eq!(sink.done_signals, 1);
    }

    #[tokio::test]
    async fn unparseable_lines_are_skipped() {
        let (result, sink) = run(vec!["data: GARBAGE\n: keep-alive\n\ndata: ok\ndata: END\n"]).await;
        assert!(result.is_ok());
        assert_eq!(sink.deltas, vec!["ok"]);
        assert_eq!(sink.done_signals, 1);
    }

    #[tokio::test]
    async fn abort_stops_without_done_signal() {
        let (result, sink) = run(vec!["data: a\ndata: BOOM\ndata: never\n"]).await;
        assert_eq!(result, Err(ChatError::StreamAbort("boom".into())));
        assert_eq!(sink.deltas, vec!["a"]);
        assert_eq!(sink.done_signals, 0);
    }

    #[tokio::test]
    async fn lines_after_termination_are_ignored() {
        let (_, sink) = run(vec!["data: a\ndata: END\ndata: late\n"]).await;
        assert_eq!(sink.deltas, vec!["a"]);
        assert_eq!(sink.done_signals, 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_reading() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = CollectingSink::default();
        let result = read_event_stream(
            stream::pending::<Result<Vec<u8>, String>>(),
            &mut EchoParser,
            &mut sink,
            &cancel,
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(sink.done_signals, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_times_out() {
        let mut sink = CollectingSink::default();
        let result = read_event_stream(
            stream::pending::<Result<Vec<u8>, String>>(),
            &mut EchoParser,
            &mut sink,
            &CancellationToken::new(),
            Duration::from_secs(30),
        )
        .await;
        assert_eq!(result, Err(ChatError::Timeout(Duration::from_secs(30))));
    }

    #[tokio::test]
    async fn transport_errors_become_network_errors() {
        let parts = vec![Ok(b"data: a\n".to_vec()), Err("connection reset".to_string())];
        let mut sink = CollectingSink::default();
        let result = read_event_stream(
            stream::iter(parts),
            &mut EchoParser,
            &mut sink,
            &CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(result, Err(ChatError::network(None, "connection reset")));
    }

    #[test]
    fn format_api_error_prefers_error_message() {
        let raw = r#"{"error":{"message":"model   overloaded","type":"overloaded_error"}}"#;
        assert_eq!(format_api_error(raw), "model overloaded");
        assert_eq!(format_api_error(r#"{"error":"bad key"}"#), "bad key");
        assert_eq!(format_api_error(r#"{"status":"failed"}"#), r#"{"status":"failed"}"#);
        assert_eq!(format_api_error("  upstream\n down "), "upstream down");
        assert_eq!(format_api_error(""), "<empty response body>");
    }
}
