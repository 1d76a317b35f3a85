//! Process-level resources shared by every command.
//!
//! An [`AppContext`] owns the loaded configuration, the key/value store, the
//! HTTP client and the tracing dispatcher. The dispatcher is scoped to the
//! context: it is installed in [`AppContext::init`] and removed again in
//! [`AppContext::teardown`] (or on drop).

use std::path::{Path, PathBuf};

use tracing::dispatcher::DefaultGuard;
use tracing::{debug, Dispatch};

use crate::core::config::Config;
use crate::core::error::ChatError;
use crate::core::message::ChatMode;
use crate::core::orchestrator::{ChatOrchestrator, OrchestratorOptions};
use crate::core::providers::{ProviderHandle, ProviderKind};
use crate::core::storage::{JsonFileStore, MemoryStore, SharedStore};
use crate::utils::logging;

/// Where the context reads its configuration and writes its logs.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Explicit config file; the platform default is used when absent.
    pub config_path: Option<PathBuf>,
    /// Append diagnostics here instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Keep state in memory only.
    pub ephemeral: bool,
}

/// Values from the command line that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub mode: Option<ChatMode>,
}

pub struct AppContext {
    config: Config,
    config_path: Option<PathBuf>,
    store: SharedStore,
    client: reqwest::Client,
    overrides: Overrides,
    log_guard: Option<DefaultGuard>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("config_path", &self.config_path)
            .field("overrides", &self.overrides)
            .field("logging", &self.log_guard.is_some())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn init(options: ContextOptions, overrides: Overrides) -> Result<Self, Box<dyn std::error::Error>> {
        let dispatch = logging::build_dispatch(options.log_file.as_deref())?;

        let config_path = match options.config_path {
            Some(path) => Some(path),
            None => Config::default_path().ok(),
        };
        let config = match &config_path {
            Some(path) => Config::load_from_path(path)?,
            None => Config::default(),
        };

        let store: SharedStore = if options.ephemeral {
            MemoryStore::shared()
        } else {
            std::sync::Arc::new(JsonFileStore::open_default()?)
        };

        let context = Self::from_parts(config, store, overrides)
            .with_config_path(config_path)
            .with_dispatch(dispatch);
        debug!(?context, "context initialized");
        Ok(context)
    }

    /// Assemble a context without touching the filesystem or logging.
    pub fn from_parts(config: Config, store: SharedStore, overrides: Overrides) -> Self {
        Self {
            config,
            config_path: None,
            store,
            client: reqwest::Client::new(),
            overrides,
            log_guard: None,
        }
    }

    fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.log_guard = Some(tracing::dispatcher::set_default(&dispatch));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    /// `--mode`, then the configured default.
    pub fn mode(&self) -> ChatMode {
        self.overrides
            .mode
            .unwrap_or_else(|| self.config.default_mode())
    }

    /// `--provider`, then `default_provider` from the config file.
    pub fn provider_kind(&self) -> Result<Option<ProviderKind>, ChatError> {
        match self
            .overrides
            .provider
            .as_deref()
            .filter(|tag| !tag.trim().is_empty())
        {
            Some(tag) => tag.parse().map(Some),
            None => self.config.default_provider_kind(),
        }
    }

    /// The provider handle described by flags and config, or `None` when no
    /// vendor is selected at all. The model may still be unset.
    pub fn build_provider(&self) -> Result<Option<ProviderHandle>, ChatError> {
        let Some(kind) = self.provider_kind()? else {
            return Ok(None);
        };
        let settings = self.config.provider(kind);

        let mut handle = ProviderHandle::connect(
            self.client.clone(),
            kind,
            settings.and_then(|p| p.api_key.as_deref()),
            settings.and_then(|p| p.base_url.as_deref()),
        )?;
        handle.session_mut().timeout = self.config.request_timeout();

        let model = self
            .overrides
            .model
            .as_deref()
            .or_else(|| settings.and_then(|p| p.model.as_deref()))
            .map(str::trim)
            .filter(|model| !model.is_empty());
        if let Some(model) = model {
            handle.switch_model(model)?;
        }
        Ok(Some(handle))
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            user_id: self.config.user_id().to_string(),
            quote_policy: self.config.quote_policy(),
        }
    }

    /// A store-backed orchestrator wired to the configured provider.
    pub fn build_orchestrator(&self) -> Result<ChatOrchestrator, ChatError> {
        let mut orchestrator =
            ChatOrchestrator::with_store(self.orchestrator_options(), self.store.clone());
        orchestrator.set_provider(self.build_provider()?);
        Ok(orchestrator)
    }

    /// Write the configuration back to where it was loaded from.
    pub fn save_config(&self) -> Result<(), Box<dyn std::error::Error>> {
        match &self.config_path {
            Some(path) => Ok(self.config.save_to_path(path)?),
            None => Err("no configuration path available".into()),
        }
    }

    /// Release the logging dispatcher. Dropping the context does the same.
    pub fn teardown(mut self) {
        debug!("context teardown");
        self.log_guard.take();
    }
}
