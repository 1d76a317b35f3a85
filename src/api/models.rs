use std::cmp::Ordering;

use serde::Serialize;

use crate::api::ModelInfo;

/// Vendor-neutral model description returned by `list_models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSummary {
    pub id: String,
    pub display_name: Option<String>,
    pub owned_by: Option<String>,
    /// Either a unix timestamp (OpenAI-style) or an RFC 3339 string
    /// (Anthropic-style), normalized to RFC 3339 when possible.
    pub created: Option<String>,
}

impl From<ModelInfo> for ModelSummary {
    fn from(info: ModelInfo) -> Self {
        let created = info
            .created
            .and_then(|secs| chrono::DateTime::from_timestamp(secs as i64, 0))
            .map(|at| at.to_rfc3339())
            .or(info.created_at);
        Self {
            id: info.id,
            display_name: info.display_name,
            owned_by: info.owned_by,
            created,
        }
    }
}

impl ModelSummary {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// Newest first; models without a creation date go last, by id.
pub fn sort_models(models: &mut [ModelInfo]) {
    models.sort_by(|a, b| match (a.created, b.created) {
        (Some(a_created), Some(b_created)) => b_created.cmp(&a_created),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => match (&a.created_at, &b.created_at) {
            (Some(a_at), Some(b_at)) => b_at.cmp(a_at),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        },
    });
}
