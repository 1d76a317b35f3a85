//! Vendor-neutral access to chat model APIs.
//!
//! Each vendor implements [`ProviderAdapter`]. Adapters are stateless apart
//! from their HTTP client; the per-connection state lives in a
//! [`ProviderSession`] that callers pass in explicitly. [`ProviderHandle`]
//! bundles the two so the orchestrator and the classifier can share a cheap
//! clone of the active connection.
//!
//! Vendors are registered in [`VENDORS`]. Supporting a new wire format means
//! writing an adapter and adding one table entry.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::models::ModelSummary;
use crate::api::ChatMessage;
use crate::core::chat_stream::{StreamSink, TokenUsage};
use crate::core::error::ChatError;

pub mod anthropic;
pub mod http;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    OpenAiCompatible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Bearer,
    Anthropic,
}

/// One row of the vendor table.
pub struct VendorEntry {
    pub kind: ProviderKind,
    pub tag: &'static str,
    pub display_name: &'static str,
    pub default_base_url: &'static str,
    pub env_key: &'static str,
    pub auth_mode: AuthMode,
    pub requires_credential: bool,
    pub build: fn(reqwest::Client) -> Arc<dyn ProviderAdapter>,
}

impl fmt::Debug for VendorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorEntry")
            .field("tag", &self.tag)
            .field("default_base_url", &self.default_base_url)
            .finish_non_exhaustive()
    }
}

static OPENAI: VendorEntry = VendorEntry {
    kind: ProviderKind::OpenAi,
    tag: "openai",
    display_name: "OpenAI",
    default_base_url: "https://api.openai.com/v1",
    env_key: "OPENAI_API_KEY",
    auth_mode: AuthMode::Bearer,
    requires_credential: true,
    build: build_openai,
};

static ANTHROPIC: VendorEntry = VendorEntry {
    kind: ProviderKind::Anthropic,
    tag: "anthropic",
    display_name: "Anthropic",
    default_base_url: "https://api.anthropic.com/v1",
    env_key: "ANTHROPIC_API_KEY",
    auth_mode: AuthMode::Anthropic,
    requires_credential: true,
    build: build_anthropic,
};

// Local Ollama proxy speaking the OpenAI wire format.
static OPENAI_COMPATIBLE: VendorEntry = VendorEntry {
    kind: ProviderKind::OpenAiCompatible,
    tag: "openai-compatible",
    display_name: "OpenAI-compatible",
    default_base_url: "http://localhost:8000/v1",
    env_key: "SOLACE_COMPAT_API_KEY",
    auth_mode: AuthMode::Bearer,
    requires_credential: false,
    build: build_openai_compatible,
};

pub static VENDORS: &[&VendorEntry] = &[&OPENAI, &ANTHROPIC, &OPENAI_COMPATIBLE];

fn build_openai(client: reqwest::Client) -> Arc<dyn ProviderAdapter> {
    Arc::new(OpenAiAdapter::new(client, ProviderKind::OpenAi))
}

fn build_openai_compatible(client: reqwest::Client) -> Arc<dyn ProviderAdapter> {
    Arc::new(OpenAiAdapter::new(client, ProviderKind::OpenAiCompatible))
}

fn build_anthropic(client: reqwest::Client) -> Arc<dyn ProviderAdapter> {
    Arc::new(AnthropicAdapter::new(client))
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::OpenAiCompatible,
    ];

    pub fn entry(self) -> &'static VendorEntry {
        match self {
            ProviderKind::OpenAi => &OPENAI,
            ProviderKind::Anthropic => &ANTHROPIC,
            ProviderKind::OpenAiCompatible => &OPENAI_COMPATIBLE,
        }
    }

    pub fn tag(self) -> &'static str {
        self.entry().tag
    }

    pub fn display_name(self) -> &'static str {
        self.entry().display_name
    }

    pub fn default_base_url(self) -> &'static str {
        self.entry().default_base_url
    }

    pub fn auth_mode(self) -> AuthMode {
        self.entry().auth_mode
    }

    /// Look up a vendor by tag, case-insensitively. `compatible` and
    /// `ollama` are accepted for the OpenAI-compatible vendor.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        match tag.as_str() {
            "compatible" | "ollama" => return Some(ProviderKind::OpenAiCompatible),
            "claude" => return Some(ProviderKind::Anthropic),
            _ => {}
        }
        VENDORS
            .iter()
            .find(|entry| entry.tag == tag)
            .map(|entry| entry.kind)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::parse(s)
            .ok_or_else(|| ChatError::configuration(format!("unknown provider '{s}'")))
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = ChatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProviderKind> for String {
    fn from(kind: ProviderKind) -> Self {
        kind.tag().to_string()
    }
}

/// Pick the credential for a vendor: explicit value, then the vendor's
/// environment variable. Blank values count as absent.
pub fn resolve_credential<F>(
    kind: ProviderKind,
    explicit: Option<&str>,
    env: F,
) -> Result<Option<String>, ChatError>
where
    F: Fn(&str) -> Option<String>,
{
    let entry = kind.entry();
    let credential = explicit
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .or_else(|| env(entry.env_key).filter(|value| !value.trim().is_empty()));

    if credential.is_none() && entry.requires_credential {
        return Err(ChatError::configuration(format!(
            "no API key for {}; set {} or add api_key to the provider config",
            entry.display_name, entry.env_key
        )));
    }
    Ok(credential)
}

/// Connection state for the active vendor.
#[derive(Clone)]
pub struct ProviderSession {
    pub kind: ProviderKind,
    credential: Option<String>,
    pub base_url: String,
    pub selected_model: Option<String>,
    pub connected: bool,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("kind", &self.kind)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("selected_model", &self.selected_model)
            .field("connected", &self.connected)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderSession {
    pub fn new(kind: ProviderKind, credential: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            credential,
            base_url: base_url.into(),
            selected_model: None,
            connected: false,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.selected_model = Some(model.into()).filter(|m: &String| !m.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// The selected model, or a configuration error when none is set.
    pub fn require_model(&self) -> Result<&str, ChatError> {
        self.selected_model
            .as_deref()
            .ok_or_else(|| ChatError::configuration("no model selected"))
    }
}

/// Vendor-neutral request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl MessageRequest {
    pub fn new(system: Option<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system: system.filter(|prompt| !prompt.trim().is_empty()),
            messages,
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Vendor-neutral non-streaming reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageResponse {
    pub content: String,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Available models, newest first.
    async fn list_models(&self, session: &ProviderSession) -> Result<Vec<ModelSummary>, ChatError>;

    /// Probe the vendor with a model listing. Never fails.
    async fn test_connection(&self, session: &ProviderSession) -> ConnectionReport {
        let started = Instant::now();
        let result = self.list_models(session).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(_) => ConnectionReport {
                success: true,
                latency_ms,
                error: None,
            },
            Err(err) => ConnectionReport {
                success: false,
                latency_ms,
                error: Some(err.to_string()),
            },
        }
    }

    /// Local selection only; the id is not checked against the vendor.
    fn switch_model(&self, session: &mut ProviderSession, model_id: &str) -> Result<(), ChatError> {
        let model_id = model_id.trim();
        if model_id.is_empty() {
            return Err(ChatError::validation("model id must not be empty"));
        }
        session.selected_model = Some(model_id.to_string());
        Ok(())
    }

    async fn send_message(
        &self,
        session: &ProviderSession,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ChatError>;

    /// Stream a reply into `sink`. Returns once the stream has finished,
    /// failed, or been cancelled.
    async fn send_stream_message(
        &self,
        session: &ProviderSession,
        request: &MessageRequest,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<(), ChatError>;
}

/// Shared handle to the active adapter and its session.
#[derive(Clone)]
pub struct ProviderHandle {
    adapter: Arc<dyn ProviderAdapter>,
    session: ProviderSession,
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("kind", &self.adapter.kind())
            .field("session", &self.session)
            .finish()
    }
}

impl ProviderHandle {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, session: ProviderSession) -> Self {
        Self { adapter, session }
    }

    /// Build a handle from the vendor table, resolving the credential from
    /// the process environment when none is given.
    pub fn connect(
        client: reqwest::Client,
        kind: ProviderKind,
        credential: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<Self, ChatError> {
        let credential = resolve_credential(kind, credential, |key| std::env::var(key).ok())?;
        let base_url = base_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(kind.default_base_url());
        let entry = kind.entry();
        Ok(Self::new(
            (entry.build)(client),
            ProviderSession::new(kind, credential, base_url),
        ))
    }

    pub fn kind(&self) -> ProviderKind {
        self.session.kind
    }

    pub fn session(&self) -> &ProviderSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ProviderSession {
        &mut self.session
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.session.selected_model.as_deref()
    }

    pub async fn test_connection(&mut self) -> ConnectionReport {
        let report = self.adapter.test_connection(&self.session).await;
        self.session.connected = report.success;
        info!(
            provider = %self.session.kind,
            success = report.success,
            latency_ms = report.latency_ms,
            "connection test finished"
        );
        report
    }

    pub async fn list_models(&self) -> Result<Vec<ModelSummary>, ChatError> {
        self.adapter.list_models(&self.session).await
    }

    pub fn switch_model(&mut self, model_id: &str) -> Result<(), ChatError> {
        self.adapter.switch_model(&mut self.session, model_id)
    }

    pub async fn send_message(&self, request: &MessageRequest) -> Result<MessageResponse, ChatError> {
        self.adapter.send_message(&self.session, request).await
    }

    pub async fn send_stream_message(
        &self,
        request: &MessageRequest,
        sink: &mut dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<(), ChatError> {
        self.adapter
            .send_stream_message(&self.session, request, sink, cancel)
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{handle_for, ScriptedAdapter};
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn every_kind_has_a_table_entry_with_matching_tag() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.entry().kind, kind);
            assert_eq!(ProviderKind::parse(kind.tag()), Some(kind));
        }
        assert_eq!(VENDORS.len(), ProviderKind::ALL.len());
        assert_eq!(ProviderKind::parse("Ollama"), Some(ProviderKind::OpenAiCompatible));
        assert_eq!(ProviderKind::parse("gemini"), None);
    }

    #[test]
    fn explicit_credential_wins_over_environment() {
        let env = |key: &str| (key == "OPENAI_API_KEY").then(|| "from-env".to_string());
        assert_eq!(
            resolve_credential(ProviderKind::OpenAi, Some("explicit"), env),
            Ok(Some("explicit".to_string()))
        );
        assert_eq!(
            resolve_credential(ProviderKind::OpenAi, Some("  "), env),
            Ok(Some("from-env".to_string()))
        );
    }

    #[test]
    fn missing_credential_is_only_allowed_for_compatible_vendor() {
        assert!(matches!(
            resolve_credential(ProviderKind::Anthropic, None, no_env),
            Err(ChatError::Configuration(_))
        ));
        assert_eq!(
            resolve_credential(ProviderKind::OpenAiCompatible, None, no_env),
            Ok(None)
        );
    }

    #[test]
    fn debug_output_redacts_the_credential() {
        let session = ProviderSession::new(ProviderKind::OpenAi, Some("sk-secret".into()), "x");
        let printed = format!("{session:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn switch_model_rejects_empty_ids_and_keeps_selection() {
        let mut handle = handle_for(Arc::new(ScriptedAdapter::replying(Ok(String::new()))));
        assert!(matches!(handle.switch_model("  "), Err(ChatError::Validation(_))));
        assert_eq!(handle.selected_model(), Some("test-model"));
        handle.switch_model("gpt-4o-mini").expect("switch");
        assert_eq!(handle.selected_model(), Some("gpt-4o-mini"));
    }

    #[test]
    fn require_model_reports_configuration_error() {
        let session = ProviderSession::new(ProviderKind::OpenAiCompatible, None, "x");
        assert!(matches!(session.require_model(), Err(ChatError::Configuration(_))));
        let blank = session.with_model(" ");
        assert!(blank.selected_model.is_none());
    }

    #[tokio::test]
    async fn test_connection_marks_session_connected() {
        let mut handle = handle_for(Arc::new(ScriptedAdapter::replying(Ok(String::new()))));
        let report = handle.test_connection().await;
        assert!(report.success);
        assert!(report.error.is_none());
        assert!(handle.session().connected);
    }

    #[test]
    fn kind_round_trips_through_serde_as_tag() {
        let json = serde_json::to_string(&ProviderKind::OpenAiCompatible).expect("serialize");
        assert_eq!(json, "\"openai-compatible\"");
        let parsed: ProviderKind = serde_json::from_str("\"anthropic\"").expect("parse");
        assert_eq!(parsed, ProviderKind::Anthropic);
    }
}
