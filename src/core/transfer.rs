//! JSON export and import of the local conversation state.
//!
//! Import only insists on `version` and `userId`. Other sections are decoded
//! leniently: a missing or malformed section is treated as empty. A valid
//! import replaces history, diversity records and settings wholesale.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::diversity::DiversityRecord;
use crate::core::error::ChatError;
use crate::core::message::{ChatMode, ConversationTurn};
use crate::core::orchestrator::{ChatOrchestrator, OrchestratorOptions};
use crate::core::providers::ProviderKind;
use crate::core::quotes::QuotePolicy;

pub const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportSettings {
    pub default_mode: ChatMode,
    pub quote: QuotePolicy,
}

/// Provider selection without the credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSnapshot {
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub settings: ExportSettings,
    pub chat_history: Vec<ConversationTurn>,
    pub analysis_history: Vec<DiversityRecord>,
    pub provider_config: Option<ProviderSnapshot>,
}

pub fn export_bundle(orchestrator: &ChatOrchestrator, default_mode: ChatMode) -> ExportBundle {
    ExportBundle {
        version: EXPORT_VERSION.to_string(),
        timestamp: Utc::now(),
        user_id: orchestrator.user_id().to_string(),
        settings: ExportSettings {
            default_mode,
            quote: orchestrator.options().quote_policy,
        },
        chat_history: orchestrator.history().to_vec(),
        analysis_history: orchestrator.diversity().records().cloned().collect(),
        provider_config: orchestrator.provider().map(|provider| ProviderSnapshot {
            kind: provider.kind(),
            base_url: provider.session().base_url.clone(),
            model: provider.selected_model().map(str::to_owned),
        }),
    }
}

pub fn export_json(orchestrator: &ChatOrchestrator, default_mode: ChatMode) -> Result<String, ChatError> {
    serde_json::to_string_pretty(&export_bundle(orchestrator, default_mode))
        .map_err(|err| ChatError::Storage(err.to_string()))
}

/// Validate and decode an export document.
pub fn parse_import(json: &str) -> Result<ExportBundle, ChatError> {
    let value: Value =
        serde_json::from_str(json).map_err(|err| ChatError::Import(format!("not valid JSON: {err}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| ChatError::Import("expected a JSON object".to_string()))?;

    let version = match object.get("version") {
        Some(Value::String(version)) if !version.trim().is_empty() => version.clone(),
        Some(Value::Number(version)) => version.to_string(),
        _ => return Err(ChatError::Import("missing version".to_string())),
    };
    let user_id = match object.get("userId") {
        Some(Value::String(user_id)) if !user_id.trim().is_empty() => user_id.clone(),
        _ => return Err(ChatError::Import("missing userId".to_string())),
    };

    Ok(ExportBundle {
        version,
        timestamp: lenient(object.get("timestamp"), "timestamp").unwrap_or_else(Utc::now),
        user_id,
        settings: lenient(object.get("settings"), "settings").unwrap_or_default(),
        chat_history: lenient(object.get("chatHistory"), "chatHistory").unwrap_or_default(),
        analysis_history: lenient(object.get("analysisHistory"), "analysisHistory")
            .unwrap_or_default(),
        provider_config: lenient(object.get("providerConfig"), "providerConfig"),
    })
}

fn lenient<T: DeserializeOwned>(value: Option<&Value>, section: &str) -> Option<T> {
    let value = value.filter(|value| !value.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(section, error = %err, "ignoring malformed import section");
            None
        }
    }
}

/// Replace the orchestrator's state with an imported bundle.
pub fn apply_import(orchestrator: &mut ChatOrchestrator, bundle: &ExportBundle) -> Result<(), ChatError> {
    orchestrator.replace_state(bundle.chat_history.clone(), bundle.analysis_history.clone())?;
    orchestrator.set_options(OrchestratorOptions {
        user_id: bundle.user_id.clone(),
        quote_policy: bundle.settings.quote,
    });
    Ok(())
}

/// Parse and apply in one step. Nothing changes when validation fails.
pub fn import_json(orchestrator: &mut ChatOrchestrator, json: &str) -> Result<ExportBundle, ChatError> {
    let bundle = parse_import(json)?;
    apply_import(orchestrator, &bundle)?;
    Ok(bundle)
}
