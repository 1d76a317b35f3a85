use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::ChatError;
use crate::core::message::ChatMode;
use crate::core::prompt::DEFAULT_USER_ID;
use crate::core::providers::{ProviderKind, DEFAULT_REQUEST_TIMEOUT};
use crate::core::quotes::QuotePolicy;

/// Per-vendor settings. Missing fields fall back to the vendor defaults.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            base_url: None,
            model: None,
            api_key: None,
        }
    }
}

/// Overrides for the quote inclusion probability.
#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq)]
pub struct QuoteSettings {
    pub base: Option<f32>,
    pub scale: Option<f32>,
    pub cap: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Vendor tag used when no `--provider` flag is given.
    pub default_provider: Option<String>,
    pub default_mode: Option<ChatMode>,
    /// Key for diversity and quote history.
    pub user_id: Option<String>,
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub quote: QuoteSettings,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    pub fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        if let Some(index) = self.providers.iter().position(|p| p.kind == kind) {
            return &mut self.providers[index];
        }
        self.providers.push(ProviderConfig::new(kind));
        let last = self.providers.len() - 1;
        &mut self.providers[last]
    }

    /// Remember `model` as the default for `kind`.
    pub fn set_default_model(&mut self, kind: ProviderKind, model: &str) {
        let model = model.trim();
        self.provider_mut(kind).model = (!model.is_empty()).then(|| model.to_string());
    }

    /// The configured default vendor. Unknown tags are an error rather than
    /// silently falling back.
    pub fn default_provider_kind(&self) -> Result<Option<ProviderKind>, ChatError> {
        self.default_provider
            .as_deref()
            .filter(|tag| !tag.trim().is_empty())
            .map(str::parse::<ProviderKind>)
            .transpose()
    }

    pub fn default_mode(&self) -> ChatMode {
        self.default_mode.unwrap_or_default()
    }

    pub fn user_id(&self) -> &str {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_USER_ID)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn quote_policy(&self) -> QuotePolicy {
        let defaults = QuotePolicy::default();
        QuotePolicy {
            base: self.quote.base.unwrap_or(defaults.base),
            scale: self.quote.scale.unwrap_or(defaults.scale),
            cap: self.quote.cap.unwrap_or(defaults.cap),
        }
    }
}
