//! Async runtime around [`ChatOrchestrator`].
//!
//! Commands are spawned as tasks that report back over one unbounded
//! channel as `(event, request_id)` pairs, which keeps chunk order intact.
//! The session pumps that channel into the orchestrator until the turn is
//! over.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::chat_stream::{StreamMetadata, StreamSink};
use crate::core::emotion::heuristic_assessment;
use crate::core::error::ChatError;
use crate::core::message::ChatMode;
use crate::core::orchestrator::{ChatOrchestrator, TurnCommand, TurnEvent};

type EventSender = mpsc::UnboundedSender<(TurnEvent, u64)>;

/// Forwards stream output as turn events.
pub struct ChannelSink {
    tx: EventSender,
    request_id: u64,
}

impl ChannelSink {
    pub fn new(tx: EventSender, request_id: u64) -> Self {
        Self { tx, request_id }
    }

    fn send(&self, event: TurnEvent) {
        // The receiver only goes away when the session is dropped.
        let _ = self.tx.send((event, self.request_id));
    }
}

impl StreamSink for ChannelSink {
    fn on_chunk(&mut self, delta: &str, is_done: bool) {
        if is_done {
            self.send(TurnEvent::Done);
        } else if !delta.is_empty() {
            self.send(TurnEvent::Chunk(delta.to_string()));
        }
    }

    fn on_metadata(&mut self, metadata: StreamMetadata) {
        self.send(TurnEvent::Metadata(metadata));
    }
}

pub struct ChatSession {
    orchestrator: ChatOrchestrator,
    tx: EventSender,
    rx: mpsc::UnboundedReceiver<(TurnEvent, u64)>,
}

impl ChatSession {
    pub fn new(orchestrator: ChatOrchestrator) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            orchestrator,
            tx,
            rx,
        }
    }

    pub fn orchestrator(&self) -> &ChatOrchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut ChatOrchestrator {
        &mut self.orchestrator
    }

    /// Run one turn to completion, reporting each applied event.
    pub async fn send<F>(&mut self, text: &str, mode: ChatMode, on_update: F) -> Result<(), ChatError>
    where
        F: FnMut(&TurnEvent, &ChatOrchestrator),
    {
        self.send_until(text, mode, &CancellationToken::new(), on_update)
            .await
    }

    /// Like [`Self::send`], but tears the turn down when `interrupt` fires.
    pub async fn send_until<F>(
        &mut self,
        text: &str,
        mode: ChatMode,
        interrupt: &CancellationToken,
        mut on_update: F,
    ) -> Result<(), ChatError>
    where
        F: FnMut(&TurnEvent, &ChatOrchestrator),
    {
        if let Some(command) = self.orchestrator.submit(text, mode)? {
            self.spawn(command);
        }

        while self.orchestrator.is_busy() {
            let received = tokio::select! {
                _ = interrupt.cancelled() => {
                    debug!("turn interrupted");
                    self.orchestrator.teardown();
                    break;
                }
                received = self.rx.recv() => received,
            };
            let Some((event, request_id)) = received else {
                break;
            };

            let current = self.orchestrator.is_current_request(request_id);
            let next = self.orchestrator.handle_event(request_id, event.clone());
            if current {
                on_update(&event, &self.orchestrator);
            }
            if let Some(command) = next {
                self.spawn(command);
            }
        }
        Ok(())
    }

    /// Run a command as a worker task plus a watcher that always reports
    /// back, so a panicking worker cannot leave the turn busy.
    fn spawn(&self, command: TurnCommand) {
        let tx = self.tx.clone();
        match command {
            TurnCommand::Classify {
                request_id,
                text,
                classifier,
            } => {
                let fallback_text = text.clone();
                let worker = tokio::spawn(async move { classifier.analyze(&text).await });
                tokio::spawn(async move {
                    let assessment = match worker.await {
                        Ok(assessment) => assessment,
                        Err(err) => {
                            warn!(error = %err, "classifier task died; using keyword heuristic");
                            heuristic_assessment(&fallback_text)
                        }
                    };
                    let _ = tx.send((TurnEvent::Classified(assessment), request_id));
                });
            }
            TurnCommand::Stream {
                request_id,
                provider,
                request,
                cancel,
            } => {
                let worker = {
                    let mut sink = ChannelSink::new(tx.clone(), request_id);
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        provider
                            .send_stream_message(&request, &mut sink, &cancel)
                            .await
                    })
                };
                tokio::spawn(async move {
                    let failure = match worker.await {
                        Ok(Ok(())) => None,
                        Ok(Err(err)) => Some(err),
                        Err(err) => {
                            warn!(error = %err, "stream task died");
                            Some(ChatError::StreamAbort("reply task stopped unexpectedly".to_string()))
                        }
                    };
                    if let Some(err) = failure {
                        if !cancel.is_cancelled() {
                            let _ = tx.send((TurnEvent::Failed(err), request_id));
                        }
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::emotion::{Emotion, Need};
    use crate::core::message::TurnRole;
    use crate::core::orchestrator::{OrchestratorOptions, TurnPhase};
    use crate::core::providers::testing::{handle_for, ScriptedAdapter};
    use crate::core::providers::{ProviderHandle, ProviderKind, ProviderSession};
    use crate::utils::random::ScriptedRandom;

    fn session_with(adapter: ScriptedAdapter) -> ChatSession {
        let orchestrator = ChatOrchestrator::new(OrchestratorOptions::default())
            .with_random(Box::new(ScriptedRandom::new(vec![0.99])))
            .with_provider(handle_for(Arc::new(adapter)));
        ChatSession::new(orchestrator)
    }

    fn last_assistant(session: &ChatSession) -> (String, bool) {
        let turn = session
            .orchestrator()
            .history()
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::Assistant)
            .expect("assistant");
        (turn.content.clone(), turn.is_streaming)
    }

    #[tokio::test]
    async fn streamed_chunks_become_the_final_reply() {
        let mut session = session_with(ScriptedAdapter::streaming(&[
            r#"data: {"choices":[{"delta":{"content":"你"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"好"}}]}"#,
            "data: [DONE]",
        ]));

        let mut seen = Vec::new();
        let mut done_events = 0;
        session
            .send("你好", ChatMode::Praise, |event, _| match event {
                TurnEvent::Chunk(delta) => seen.push(delta.clone()),
                TurnEvent::Done => done_events += 1,
                _ => {}
            })
            .await
            .expect("send");

        assert_eq!(seen, vec!["你", "好"]);
        assert_eq!(done_events, 1);
        assert_eq!(last_assistant(&session), ("你好".to_string(), false));
        assert_eq!(session.orchestrator().phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn smart_mode_classifies_before_streaming() {
        let mut session = session_with(ScriptedAdapter {
            reply: Ok(r#"{"primaryEmotion":"proud","intensity":0.9,"needs":"praise","confidence":0.8}"#.into()),
            ..ScriptedAdapter::streaming(&[r#"data: {"choices":[{"delta":{"content":"太棒了"}}]}"#])
        });

        let mut classified = false;
        session
            .send("我拿到奖学金了", ChatMode::Smart, |event, _| {
                if matches!(event, TurnEvent::Classified(_)) {
                    classified = true;
                }
            })
            .await
            .expect("send");

        assert!(classified);
        let history = session.orchestrator().history();
        assert_eq!(history[1].mode, Some(ChatMode::Praise));
        assert_eq!(history[1].content, "太棒了");
        assert!(history[1].emotion_assessment.is_some());
    }

    #[tokio::test]
    async fn stream_errors_fail_the_turn() {
        let mut session = session_with(ScriptedAdapter {
            stream_error: Some(ChatError::Timeout(std::time::Duration::from_secs(30))),
            ..ScriptedAdapter::streaming(&[])
        });
        session
            .send("在吗", ChatMode::Comfort, |_, _| {})
            .await
            .expect("send");

        let (content, streaming) = last_assistant(&session);
        assert!(content.contains("请求超时"));
        assert!(!streaming);
        assert!(matches!(
            session.orchestrator_mut().take_notification(),
            Some(ChatError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn mid_stream_abort_fails_the_turn() {
        let mut session = session_with(ScriptedAdapter::streaming(&[
            r#"data: {"choices":[{"delta":{"content":"半"}}]}"#,
            r#"data: {"error":{"message":"upstream died"}}"#,
        ]));
        session
            .send("讲讲", ChatMode::Praise, |_, _| {})
            .await
            .expect("send");
        let (content, _) = last_assistant(&session);
        assert_eq!(content, "⚠️ 回复中断：upstream died");
    }

    #[tokio::test]
    async fn interrupt_tears_down_the_turn() {
        let mut session = session_with(ScriptedAdapter::streaming(&[]));
        let interrupt = CancellationToken::new();
        interrupt.cancel();
        session
            .send_until("hi", ChatMode::Praise, &interrupt, |_, _| {})
            .await
            .expect("send");
        assert!(!session.orchestrator().is_busy());
        assert!(!last_assistant(&session).1);
    }

    #[tokio::test]
    async fn empty_input_is_reported_to_the_caller() {
        let mut session = session_with(ScriptedAdapter::streaming(&[]));
        let result = session.send(" ", ChatMode::Praise, |_, _| {}).await;
        assert!(matches!(result, Err(ChatError::Validation(_))));
        assert!(session.orchestrator().history().is_empty());
    }

    async fn send_collecting_assessment(
        session: &mut ChatSession,
        text: &str,
    ) -> Option<crate::core::emotion::EmotionAssessment> {
        let mut classified = None;
        session
            .send(text, ChatMode::Smart, |event, _| {
                if let TurnEvent::Classified(assessment) = event {
                    classified = Some(assessment.clone());
                }
            })
            .await
            .expect("send");
        classified
    }

    fn assert_failed_on_configuration(session: &mut ChatSession) {
        let history = session.orchestrator().history().to_vec();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].mode, Some(ChatMode::Comfort));
        assert!(!history[1].is_streaming);

        let notification = session
            .orchestrator_mut()
            .take_notification()
            .expect("notification");
        assert!(matches!(notification, ChatError::Configuration(_)));
        assert_eq!(history[1].content, notification.user_message());
        assert_eq!(session.orchestrator().phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn smart_mode_without_provider_classifies_locally_then_fails() {
        let orchestrator = ChatOrchestrator::new(OrchestratorOptions::default())
            .with_random(Box::new(ScriptedRandom::new(vec![0.99])));
        let mut session = ChatSession::new(orchestrator);

        let assessment = send_collecting_assessment(&mut session, "我今天很难过")
            .await
            .expect("classified");
        assert_eq!(assessment.primary_emotion(), Emotion::Sad);
        assert_eq!(assessment.needs(), Need::Comfort);
        assert_failed_on_configuration(&mut session);
    }

    #[tokio::test]
    async fn provider_without_model_never_reaches_the_network() {
        let adapter = Arc::new(ScriptedAdapter::streaming(&["data: [DONE]"]));
        let provider = ProviderHandle::new(
            adapter.clone(),
            ProviderSession::new(ProviderKind::OpenAiCompatible, None, "http://test/v1"),
        );
        let orchestrator = ChatOrchestrator::new(OrchestratorOptions::default())
            .with_random(Box::new(ScriptedRandom::new(vec![0.99])))
            .with_provider(provider);
        let mut session = ChatSession::new(orchestrator);

        let assessment = send_collecting_assessment(&mut session, "我今天很难过")
            .await
            .expect("classified");
        assert_eq!(assessment.primary_emotion(), Emotion::Sad);
        assert_failed_on_configuration(&mut session);
        assert!(adapter.recorded().is_empty());
    }

    #[tokio::test]
    async fn panicking_tasks_fail_the_turn_instead_of_hanging() {
        let mut session = session_with(ScriptedAdapter {
            panics: true,
            ..ScriptedAdapter::streaming(&[])
        });

        let assessment = send_collecting_assessment(&mut session, "我今天很难过")
            .await
            .expect("classified");
        // The classifier task died, so the keyword heuristic answered.
        assert_eq!(assessment.confidence(), 0.6);

        assert!(!session.orchestrator().is_busy());
        let (content, streaming) = last_assistant(&session);
        assert!(!streaming);
        assert!(content.starts_with("⚠️"));
        assert!(matches!(
            session.orchestrator_mut().take_notification(),
            Some(ChatError::StreamAbort(_))
        ));
    }
}
