//! OpenAI `chat/completions` adapter, shared by the OpenAI-compatible vendor.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::api::models::{sort_models, ModelSummary};
use crate::api::{ChatMessage, ChatRequest, ChatResponse, CompletionResponse, ModelsResponse, OpenAiUsage};
use crate::core::chat_stream::{
    extract_data_payload, extract_error_summary, read_event_stream, LineOutcome, StreamMetadata,
    StreamParser, StreamSink, TokenUsage,
};
use crate::core::error::ChatError;
use crate::core::providers::http::{apply_auth, endpoint_url, read_json, send_checked};
use crate::core::providers::{
    MessageRequest, MessageResponse, ProviderAdapter, ProviderKind, ProviderSession,
};

const DONE_SENTINEL: &str = "[DONE]";

pub struct OpenAiAdapter {
    client: reqwest::Client,
    kind: ProviderKind,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client, kind: ProviderKind) -> Self {
        Self { client, kind }
    }
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(usage: OpenAiUsage) -> Self {
        let mut normalized = TokenUsage::new(usage.prompt_tokens, usage.completion_tokens);
        if usage.total_tokens > 0 {
            normalized.total_tokens = usage.total_tokens;
        }
        normalized
    }
}

/// The system prompt travels as the first `system` message.
pub fn build_chat_request(model: &str, request: &MessageRequest, stream: bool) -> ChatRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(ChatMessage::new("system", system.clone()));
    }
    messages.extend(request.messages.iter().cloned());
    ChatRequest {
        model: model.to_string(),
        messages,
        stream,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

/// Line parser for OpenAI-style `data:` chunks.
#[derive(Debug, Default)]
pub struct OpenAiStreamParser {
    model: Option<String>,
}

impl StreamParser for OpenAiStreamParser {
    fn parse_line(
        &mut self,
        line: &str,
        sink: &mut dyn StreamSink,
    ) -> Result<LineOutcome, ChatError> {
        let Some(payload) = extract_data_payload(line) else {
            return Ok(LineOutcome::Continue);
        };
        if payload == DONE_SENTINEL {
            return Ok(LineOutcome::Finished);
        }

        let value: serde_json::Value = serde_json::from_str(payload)
            .map_err(|err| ChatError::ProtocolParse(format!("{err}: {payload}")))?;
        if let Some(summary) = extract_error_summary(&value) {
            return Err(ChatError::StreamAbort(summary));
        }
        let chunk: ChatResponse = serde_json::from_value(value)
            .map_err(|err| ChatError::ProtocolParse(format!("{err}: {payload}")))?;

        if chunk.model.is_some() {
            self.model = chunk.model.clone();
        }
        let usage = chunk.usage.map(TokenUsage::from);

        for choice in chunk.choices {
            let content = choice.delta.content.unwrap_or_default();
            if choice.finish_reason.as_deref() == Some("error") {
                // Proxies report upstream failures as a final content chunk.
                let detail = if content.trim().is_empty() {
                    "provider reported an error".to_string()
                } else {
                    content
                };
                return Err(ChatError::StreamAbort(detail));
            }
            if !content.is_empty() {
                sink.on_chunk(&content, false);
            }
            if let Some(reason) = choice.finish_reason {
                sink.on_metadata(StreamMetadata {
                    model: self.model.clone(),
                    finish_reason: Some(reason),
                    usage,
                });
                return Ok(LineOutcome::Continue);
            }
        }

        // Usage-only chunk sent after the final choice.
        if usage.is_some() {
            sink.on_metadata(StreamMetadata {
                model: self.model.clone(),
                finish_reason: None,
                usage,
            });
        }
        Ok(LineOutcome::Continue)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn list_models(&self, session: &ProviderSession) -> Result<Vec<ModelSummary>, ChatError> {
        let request = apply_auth(
            self.client.get(endpoint_url(&session.base_url, "models")),
            session,
        );
        let response = send_checked(request, session.timeout).await?;
        let mut listing: ModelsResponse = read_json(response, session.timeout).await?;
        sort_models(&mut listing.data);
        Ok(listing.data.into_iter().map(ModelSummary::from).collect())
    }

    async fn send_message(
        &self,
        session: &ProviderSession,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ChatError> {
        let model = session.require_model()?;
        let body = build_chat_request(model, request, false);
        let http = apply_auth(
            self.client
                .post(endpoint_url(&session.base_url, "chat/completions"))
                .header("Content-Type", "application/json"),
            session,
        )
        .json(&body);

        let response = send_checked(http, session.timeout).await?;
        let completion: CompletionResponse = read_json(response, session.timeout).await?;
        let usage = completion.usage.map(TokenUsage::from).unwrap_or_default();
        let first = completion.choices.into_iter().next();
        Ok(MessageResponse {
            content: first
                .as_ref()
                .and_then(|choice| choice.message.content.clone())
                .unwrap_or_default(),
            finish_reason: first.and_then(|choice| choice.finish_reason),
            model: completion.model,
            usage,
        })
    }

    async fn send_stream_message(
        &self,
        session: &ProviderSession,
        request: &MessageRequest,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<(), ChatError> {
        let model = session.require_model()?;
        let body = build_chat_request(model, request, true);
        let http = apply_auth(
            self.client
                .post(endpoint_url(&session.base_url, "chat/completions"))
                .header("Content-Type", "application/json")
                .header("Accept", "text/event-stream"),
            session,
        )
        .json(&body);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            response = send_checked(http, session.timeout) => response?,
        };
        let mut parser = OpenAiStreamParser::default();
        read_event_stream(
            Box::pin(response.bytes_stream()),
            &mut parser,
            sink,
            cancel,
            session.timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::CollectingSink;

    fn feed(lines: &[&str]) -> (Vec<Result<LineOutcome, ChatError>>, CollectingSink) {
        let mut parser = OpenAiStreamParser::default();
        let mut sink = CollectingSink::default();
        let outcomes = lines
            .iter()
            .map(|line| parser.parse_line(line, &mut sink))
            .collect();
        (outcomes, sink)
    }

    #[test]
    fn parses_deltas_and_done_sentinel_with_either_spacing() {
        let (outcomes, sink) = feed(&[
            r#"data: {"choices":[{"delta":{"content":"你"}}]}"#,
            r#"data:{"choices":[{"delta":{"content":"好"}}]}"#,
            "data:[DONE]",
        ]);
        assert_eq!(sink.content(), "你好");
        assert_eq!(outcomes.last(), Some(&Ok(LineOutcome::Finished)));
    }

    #[test]
    fn finish_reason_and_usage_become_metadata() {
        let (_, sink) = feed(&[
            r#"data: {"model":"gpt-4o","choices":[{"delta":{"content":"hi"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
        ]);
        assert_eq!(
            sink.metadata,
            vec![StreamMetadata {
                model: Some("gpt-4o".into()),
                finish_reason: Some("stop".into()),
                usage: Some(TokenUsage::new(3, 2)),
            }]
        );
    }

    #[test]
    fn error_payload_aborts_the_stream() {
        let (outcomes, _) = feed(&[r#"data: {"error":{"message":"rate limited"}}"#]);
        assert_eq!(
            outcomes[0],
            Err(ChatError::StreamAbort("rate limited".into()))
        );
    }

    #[test]
    fn proxy_error_finish_reason_aborts_with_chunk_text() {
        let (outcomes, sink) = feed(&[
            r#"data: {"choices":[{"delta":{"content":"Error: upstream unavailable"},"finish_reason":"error"}]}"#,
        ]);
        assert_eq!(
            outcomes[0],
            Err(ChatError::StreamAbort("Error: upstream unavailable".into()))
        );
        assert!(sink.deltas.is_empty());
    }

    #[test]
    fn malformed_json_is_a_recoverable_parse_error() {
        let (outcomes, _) = feed(&["data: {not json"]);
        assert!(matches!(&outcomes[0], Err(err) if err.is_recoverable()));
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let (outcomes, sink) = feed(&["event: ping", "id: 7"]);
        assert!(outcomes.iter().all(|o| o == &Ok(LineOutcome::Continue)));
        assert!(sink.deltas.is_empty());
    }

    #[test]
    fn system_prompt_is_inlined_as_first_message() {
        let request = MessageRequest::new(
            Some("be kind".into()),
            vec![ChatMessage::new("user", "hello")],
        )
        .with_temperature(0.7);
        let body = build_chat_request("gpt-4o", &request, true);
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be kind");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["stream"], true);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn usage_totals_default_when_missing() {
        let usage = TokenUsage::from(OpenAiUsage {
            prompt_tokens: 4,
            completion_tokens: 6,
            total_tokens: 0,
        });
        assert_eq!(usage.total_tokens, 10);
    }
}
