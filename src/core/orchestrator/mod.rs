//! Per-turn state machine.
//!
//! The orchestrator is synchronous. [`ChatOrchestrator::submit`] and
//! [`ChatOrchestrator::handle_event`] hand back [`TurnCommand`]s describing
//! the async work to run next; a runtime (see [`crate::core::session`])
//! executes them and feeds the resulting [`TurnEvent`]s back, tagged with the
//! request id. Events carrying any other id are stale and dropped.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatMessage;
use crate::core::chat_stream::StreamMetadata;
use crate::core::classifier::EmotionClassifier;
use crate::core::diversity::DiversityTracker;
use crate::core::emotion::{recommend_mode, EmotionAssessment};
use crate::core::error::ChatError;
use crate::core::message::{ChatMode, ConversationTurn};
use crate::core::prompt::{PromptAssembler, DEFAULT_USER_ID};
use crate::core::providers::{MessageRequest, ProviderHandle};
use crate::core::quotes::{QuotePolicy, QuoteStore};
use crate::core::storage::{load_or_default, save_best_effort, SharedStore, CHAT_HISTORY_KEY};
use crate::utils::random::{OsRandom, RandomSource};

mod phase;

pub use phase::{InvalidTransition, TurnPhase};

const REPLY_TEMPERATURE: f32 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorOptions {
    pub user_id: String,
    pub quote_policy: QuotePolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            user_id: DEFAULT_USER_ID.to_string(),
            quote_policy: QuotePolicy::default(),
        }
    }
}

/// Content streamed so far for the in-flight request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    pub request_id: u64,
    pub accumulated_content: String,
    pub done: bool,
}

/// Async work requested by the orchestrator.
#[derive(Debug)]
pub enum TurnCommand {
    Classify {
        request_id: u64,
        text: String,
        classifier: EmotionClassifier,
    },
    Stream {
        request_id: u64,
        provider: ProviderHandle,
        request: MessageRequest,
        cancel: CancellationToken,
    },
}

impl TurnCommand {
    pub fn request_id(&self) -> u64 {
        match self {
            TurnCommand::Classify { request_id, .. } | TurnCommand::Stream { request_id, .. } => {
                *request_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Classified(EmotionAssessment),
    Chunk(String),
    Metadata(StreamMetadata),
    Done,
    Failed(ChatError),
}

struct ActiveTurn {
    text: String,
    user_index: usize,
    assistant_index: usize,
    mode: ChatMode,
    assessment: Option<EmotionAssessment>,
    stream: StreamState,
    cancel: CancellationToken,
}

pub struct ChatOrchestrator {
    history: Vec<ConversationTurn>,
    phase: TurnPhase,
    active: Option<ActiveTurn>,
    last_request_id: u64,
    provider: Option<ProviderHandle>,
    classifier: EmotionClassifier,
    diversity: DiversityTracker,
    quotes: QuoteStore,
    random: Box<dyn RandomSource>,
    store: Option<SharedStore>,
    options: OrchestratorOptions,
    last_metadata: Option<StreamMetadata>,
    notification: Option<ChatError>,
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("phase", &self.phase)
            .field("turns", &self.history.len())
            .field("last_request_id", &self.last_request_id)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl ChatOrchestrator {
    /// In-memory orchestrator with no persistence.
    pub fn new(options: OrchestratorOptions) -> Self {
        Self {
            history: Vec::new(),
            phase: TurnPhase::Idle,
            active: None,
            last_request_id: 0,
            provider: None,
            classifier: EmotionClassifier::heuristic(),
            diversity: DiversityTracker::new(),
            quotes: QuoteStore::new(),
            random: Box::new(OsRandom),
            store: None,
            options,
            last_metadata: None,
            notification: None,
        }
    }

    /// Orchestrator backed by `store`, restoring history, diversity records
    /// and quote usage.
    pub fn with_store(options: OrchestratorOptions, store: SharedStore) -> Self {
        let mut history: Vec<ConversationTurn> =
            load_or_default(store.as_ref(), CHAT_HISTORY_KEY);
        // A turn still marked streaming was interrupted by a previous exit.
        for turn in &mut history {
            turn.is_streaming = false;
        }
        Self {
            history,
            diversity: DiversityTracker::load(store.clone()),
            quotes: QuoteStore::load(store.clone()),
            store: Some(store),
            ..Self::new(options)
        }
    }

    pub fn with_random(mut self, random: Box<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_provider(mut self, provider: ProviderHandle) -> Self {
        self.set_provider(Some(provider));
        self
    }

    pub fn set_provider(&mut self, provider: Option<ProviderHandle>) {
        self.classifier.set_provider(provider.clone());
        self.provider = provider;
    }

    pub fn provider(&self) -> Option<&ProviderHandle> {
        self.provider.as_ref()
    }

    pub fn switch_model(&mut self, model_id: &str) -> Result<(), ChatError> {
        let provider = self
            .provider
            .as_mut()
            .ok_or_else(|| ChatError::configuration("no provider configured"))?;
        provider.switch_model(model_id)?;
        let updated = provider.clone();
        self.classifier.set_provider(Some(updated));
        Ok(())
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase.is_busy()
    }

    pub fn user_id(&self) -> &str {
        &self.options.user_id
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn diversity(&self) -> &DiversityTracker {
        &self.diversity
    }

    pub fn stream_state(&self) -> Option<&StreamState> {
        self.active.as_ref().map(|active| &active.stream)
    }

    pub fn last_metadata(&self) -> Option<&StreamMetadata> {
        self.last_metadata.as_ref()
    }

    /// Error from the most recent failed turn, cleared on read.
    pub fn take_notification(&mut self) -> Option<ChatError> {
        self.notification.take()
    }

    pub fn is_current_request(&self, request_id: u64) -> bool {
        self.active.is_some() && self.last_request_id == request_id
    }

    /// Start a turn.
    ///
    /// Returns the first command to run, or `None` when the turn already
    /// failed locally (see [`Self::take_notification`]).
    pub fn submit(&mut self, text: &str, mode: ChatMode) -> Result<Option<TurnCommand>, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::validation("message is empty"));
        }
        if self.phase.is_busy() {
            debug!("submit rejected: a turn is already in flight");
            return Err(ChatError::ConcurrencyRejected);
        }

        self.advance(TurnPhase::Dispatching);
        self.last_request_id += 1;
        let request_id = self.last_request_id;
        self.last_metadata = None;
        self.notification = None;

        let stamp = Utc::now().timestamp_millis();
        self.history.push(ConversationTurn::user(
            format!("user-{stamp}-{request_id}"),
            text,
            mode,
        ));
        let user_index = self.history.len() - 1;
        self.history.push(ConversationTurn::assistant_placeholder(
            format!("assistant-{stamp}-{request_id}"),
            mode,
        ));
        let assistant_index = self.history.len() - 1;

        self.active = Some(ActiveTurn {
            text: text.to_string(),
            user_index,
            assistant_index,
            mode,
            assessment: None,
            stream: StreamState {
                request_id,
                ..StreamState::default()
            },
            cancel: CancellationToken::new(),
        });
        debug!(request_id, mode = mode.as_str(), "turn dispatched");

        if mode == ChatMode::Smart {
            self.advance(TurnPhase::EmotionClassifying);
            return Ok(Some(TurnCommand::Classify {
                request_id,
                text: text.to_string(),
                classifier: self.classifier.clone(),
            }));
        }
        Ok(self.start_stream())
    }

    /// Apply an event from the runtime, returning the next command if any.
    pub fn handle_event(&mut self, request_id: u64, event: TurnEvent) -> Option<TurnCommand> {
        if !self.is_current_request(request_id) {
            debug!(request_id, "dropping stale turn event");
            return None;
        }

        match (self.phase, event) {
            (TurnPhase::EmotionClassifying, TurnEvent::Classified(assessment)) => {
                self.apply_assessment(assessment);
                self.start_stream()
            }
            (TurnPhase::Streaming, TurnEvent::Chunk(delta)) => {
                self.append_chunk(&delta);
                None
            }
            (TurnPhase::Streaming, TurnEvent::Metadata(metadata)) => {
                self.last_metadata = Some(metadata);
                None
            }
            (TurnPhase::Streaming, TurnEvent::Done) => {
                self.finalize();
                None
            }
            (_, TurnEvent::Failed(err)) => {
                self.fail(err);
                None
            }
            (phase, event) => {
                warn!(?phase, ?event, "ignoring event out of phase");
                None
            }
        }
    }

    /// Abandon the in-flight turn, keeping whatever content arrived.
    pub fn teardown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        if let Some(turn) = self.history.get_mut(active.assistant_index) {
            turn.content = active.stream.accumulated_content;
            turn.is_streaming = false;
        }
        self.advance(TurnPhase::Failed);
        self.advance(TurnPhase::Idle);
        self.persist_history();
        debug!(request_id = active.stream.request_id, "turn torn down");
    }

    pub fn clear_history(&mut self) -> Result<(), ChatError> {
        if self.phase.is_busy() {
            return Err(ChatError::ConcurrencyRejected);
        }
        self.history.clear();
        self.persist_history();
        Ok(())
    }

    /// Replace history and diversity records wholesale. Used by import.
    pub fn replace_state(
        &mut self,
        history: Vec<ConversationTurn>,
        diversity: Vec<crate::core::diversity::DiversityRecord>,
    ) -> Result<(), ChatError> {
        if self.phase.is_busy() {
            return Err(ChatError::ConcurrencyRejected);
        }
        self.history = history;
        for turn in &mut self.history {
            turn.is_streaming = false;
        }
        self.diversity.replace_all(diversity);
        self.persist_history();
        Ok(())
    }

    pub fn set_options(&mut self, options: OrchestratorOptions) {
        self.options = options;
    }

    fn advance(&mut self, to: TurnPhase) {
        match self.phase.transition(to) {
            Ok(next) => {
                debug!(from = ?self.phase, to = ?next, "turn phase");
                self.phase = next;
            }
            Err(err) => warn!(error = %err, "rejected turn transition"),
        }
    }

    fn apply_assessment(&mut self, assessment: EmotionAssessment) {
        let mode = recommend_mode(&assessment);
        let Some(active) = self.active.as_mut() else {
            return;
        };
        debug!(
            emotion = assessment.primary_emotion().as_str(),
            from = active.mode.as_str(),
            to = mode.as_str(),
            "mode from assessment"
        );
        active.mode = mode;
        if let Some(turn) = self.history.get_mut(active.user_index) {
            turn.emotion_assessment = Some(assessment.clone());
        }
        if let Some(turn) = self.history.get_mut(active.assistant_index) {
            turn.mode = Some(mode);
        }
        active.assessment = Some(assessment);
    }

    fn start_stream(&mut self) -> Option<TurnCommand> {
        self.advance(TurnPhase::PromptBuilding);

        let provider = match self.provider.as_ref() {
            None => {
                self.fail(ChatError::configuration("no provider configured"));
                return None;
            }
            Some(provider) if provider.selected_model().is_none() => {
                self.fail(ChatError::configuration("no model selected"));
                return None;
            }
            Some(provider) => provider.clone(),
        };

        let active = self.active.as_ref()?;
        let request_id = active.stream.request_id;
        let text = active.text.clone();
        let mode = active.mode;
        let assessment = active.assessment.clone();
        let cancel = active.cancel.clone();
        let context = &self.history[..active.user_index];
        let user_id = self.options.user_id.as_str();

        let mut assembler = PromptAssembler::new(
            &self.diversity,
            &mut self.quotes,
            self.options.quote_policy,
            self.random.as_mut(),
        );
        let system = assembler.build_system_prompt(mode, assessment.as_ref(), Some(user_id));
        let user_message = assembler.build_user_message(
            &text,
            context,
            assessment.as_ref(),
            Some(user_id),
            Some(mode),
        );

        let request = MessageRequest::new(Some(system), vec![ChatMessage::new("user", user_message)])
            .with_temperature(REPLY_TEMPERATURE);
        self.advance(TurnPhase::Streaming);

        Some(TurnCommand::Stream {
            request_id,
            provider,
            request,
            cancel,
        })
    }

    fn append_chunk(&mut self, delta: &str) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.stream.done || delta.is_empty() {
            return;
        }
        active.stream.accumulated_content.push_str(delta);
        if let Some(turn) = self.history.get_mut(active.assistant_index) {
            turn.content.push_str(delta);
        }
    }

    fn finalize(&mut self) {
        self.advance(TurnPhase::Finalizing);
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.stream.done = true;
        let content = std::mem::take(&mut active.stream.accumulated_content);

        if let Some(turn) = self.history.get_mut(active.assistant_index) {
            turn.content = content.clone();
            turn.is_streaming = false;
            turn.mode = Some(active.mode);
            turn.emotion_assessment = active.assessment.clone();
        }
        self.diversity
            .analyze_and_store(&content, &self.options.user_id);
        self.persist_history();
        self.advance(TurnPhase::Idle);
        debug!(
            request_id = active.stream.request_id,
            chars = content.chars().count(),
            "turn finished"
        );
    }

    fn fail(&mut self, err: ChatError) {
        self.advance(TurnPhase::Failed);
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Some(turn) = self.history.get_mut(active.assistant_index) {
                turn.content = err.user_message();
                turn.is_streaming = false;
                turn.is_error = true;
                turn.mode = Some(active.mode);
            }
        }
        warn!(error = %err, "turn failed");
        self.notification = Some(err);
        self.persist_history();
        self.advance(TurnPhase::Idle);
    }

    fn persist_history(&self) {
        if let Some(store) = &self.store {
            save_best_effort(store.as_ref(), CHAT_HISTORY_KEY, &self.history);
        }
    }
}
