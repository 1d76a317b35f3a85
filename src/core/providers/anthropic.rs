//! Anthropic `messages` adapter.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::api::models::{sort_models, ModelSummary};
use crate::api::{AnthropicStreamEvent, MessagesRequest, MessagesResponse, ModelsResponse};
use crate::core::chat_stream::{
    extract_data_payload, read_event_stream, LineOutcome, StreamMetadata, StreamParser,
    StreamSink, TokenUsage,
};
use crate::core::error::ChatError;
use crate::core::providers::http::{apply_auth, endpoint_url, read_json, send_checked};
use crate::core::providers::{
    MessageRequest, MessageResponse, ProviderAdapter, ProviderKind, ProviderSession,
};

/// `max_tokens` is mandatory for this API.
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicAdapter {
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// The system prompt moves to the top-level `system` field; any `system`
/// role messages are folded into it.
pub fn build_messages_request(model: &str, request: &MessageRequest, stream: bool) -> MessagesRequest {
    let mut system_parts: Vec<String> = request.system.iter().cloned().collect();
    let mut messages = Vec::with_capacity(request.messages.len());
    for message in &request.messages {
        if message.role == "system" {
            system_parts.push(message.content.clone());
        } else {
            messages.push(message.clone());
        }
    }
    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

    MessagesRequest {
        model: model.to_string(),
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system,
        messages,
        stream,
        temperature: request.temperature,
    }
}

/// Line parser for Anthropic's typed stream events.
#[derive(Debug, Default)]
pub struct AnthropicStreamParser {
    model: Option<String>,
    input_tokens: u32,
}

impl StreamParser for AnthropicStreamParser {
    fn parse_line(
        &mut self,
        line: &str,
        sink: &mut dyn StreamSink,
    ) -> Result<LineOutcome, ChatError> {
        // `event:` lines repeat the type carried in the data payload.
        let Some(payload) = extract_data_payload(line) else {
            return Ok(LineOutcome::Continue);
        };
        let event: AnthropicStreamEvent = serde_json::from_str(payload)
            .map_err(|err| ChatError::ProtocolParse(format!("{err}: {payload}")))?;

        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.model = message.model;
                self.input_tokens = message.usage.map(|u| u.input_tokens).unwrap_or(0);
            }
            AnthropicStreamEvent::ContentBlockDelta { delta } => {
                if let Some(text) = delta.text.filter(|text| !text.is_empty()) {
                    sink.on_chunk(&text, false);
                }
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                sink.on_metadata(StreamMetadata {
                    model: self.model.clone(),
                    finish_reason: delta.stop_reason,
                    usage: usage.map(|u| TokenUsage::new(self.input_tokens, u.output_tokens)),
                });
            }
            AnthropicStreamEvent::MessageStop => return Ok(LineOutcome::Finished),
            AnthropicStreamEvent::Error { error } => {
                let detail = error
                    .message
                    .or(error.kind)
                    .unwrap_or_else(|| "unknown stream error".to_string());
                return Err(ChatError::StreamAbort(detail));
            }
            AnthropicStreamEvent::ContentBlockStart {}
            | AnthropicStreamEvent::ContentBlockStop {}
            | AnthropicStreamEvent::Ping => {}
        }
        Ok(LineOutcome::Continue)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
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
        let body = build_messages_request(model, request, false);
        let http = apply_auth(
            self.client
                .post(endpoint_url(&session.base_url, "messages"))
                .header("Content-Type", "application/json"),
            session,
        )
        .json(&body);

        let response = send_checked(http, session.timeout).await?;
        let reply: MessagesResponse = read_json(response, session.timeout).await?;
        let content = reply
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<String>();
        let usage = reply
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();
        Ok(MessageResponse {
            content,
            model: reply.model,
            finish_reason: reply.stop_reason,
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
        let body = build_messages_request(model, request, true);
        let http = apply_auth(
            self.client
                .post(endpoint_url(&session.base_url, "messages"))
                .header("Content-Type", "application/json")
                .header("Accept", "text/event-stream"),
            session,
        )
        .json(&body);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            response = send_checked(http, session.timeout) => response?,
        };
        let mut parser = AnthropicStreamParser::default();
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
    use crate::api::ChatMessage;
    use crate::core::chat_stream::CollectingSink;

    fn feed(lines: &[&str]) -> (Vec<Result<LineOutcome, ChatError>>, CollectingSink) {
        let mut parser = AnthropicStreamParser::default();
        let mut sink = CollectingSink::default();
        let outcomes = lines
            .iter()
            .map(|line| parser.parse_line(line, &mut sink))
            .collect();
        (outcomes, sink)
    }

    #[test]
    fn full_event_sequence_yields_text_metadata_and_stop() {
        let (outcomes, sink) = feed(&[
            "event: message_start",
            r#"data: {"type":"message_start","message":{"id":"msg_1","model":"claude-sonnet-4","usage":{"input_tokens":12,"output_tokens":1}}}"#,
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"data: {"type":"ping"}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"你"}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"好"}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":7}}"#,
            r#"data: {"type":"message_stop"}"#,
        ]);
        assert_eq!(sink.content(), "你好");
        assert_eq!(outcomes.last(), Some(&Ok(LineOutcome::Finished)));
        assert_eq!(
            sink.metadata,
            vec![StreamMetadata {
                model: Some("claude-sonnet-4".into()),
                finish_reason: Some("end_turn".into()),
                usage: Some(TokenUsage::new(12, 7)),
            }]
        );
    }

    #[test]
    fn error_event_aborts() {
        let (outcomes, _) = feed(&[
            r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ]);
        assert_eq!(outcomes[0], Err(ChatError::StreamAbort("Overloaded".into())));
    }

    #[test]
    fn unknown_event_types_are_recoverable() {
        let (outcomes, _) = feed(&[r#"data: {"type":"brand_new_event"}"#]);
        assert!(matches!(&outcomes[0], Err(err) if err.is_recoverable()));
    }

    #[test]
    fn system_prompt_moves_to_top_level_field() {
        let request = MessageRequest::new(
            Some("be gentle".into()),
            vec![
                ChatMessage::new("system", "stay brief"),
                ChatMessage::new("user", "hi"),
            ],
        );
        let body = build_messages_request("claude", &request, true);
        assert_eq!(body.system.as_deref(), Some("be gentle\n\nstay brief"));
        assert_eq!(body.messages, vec![ChatMessage::new("user", "hi")]);
        assert_eq!(body.max_tokens, DEFAULT_MAX_TOKENS);
    }
}
