//! Local key/value persistence.
//!
//! Values are opaque JSON blobs. Writes are read-modify-write without locks
//! spanning multiple calls; concurrent writers resolve last-write-wins.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::core::config::io::{project_dirs, write_atomic};
use crate::core::error::ChatError;

pub const CHAT_HISTORY_KEY: &str = "chat_history";
pub const DIVERSITY_HISTORY_KEY: &str = "diversity_history";
pub const QUOTE_USAGE_KEY: &str = "quote_usage";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, ChatError>;
    fn set(&self, key: &str, value: Value) -> Result<(), ChatError>;
    fn remove(&self, key: &str) -> Result<(), ChatError>;
}

pub type SharedStore = Arc<dyn KeyValueStore>;

/// Decode a stored value, treating missing or malformed data as absent.
pub fn load_or_default<T>(store: &dyn KeyValueStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match store.get(key) {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|err| {
            warn!(key, error = %err, "discarding malformed stored value");
            T::default()
        }),
        Ok(None) => T::default(),
        Err(err) => {
            warn!(key, error = %err, "failed to read stored value");
            T::default()
        }
    }
}

/// Encode and write a value, logging instead of failing.
pub fn save_best_effort<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) {
    let result = serde_json::to_value(value)
        .map_err(|err| ChatError::Storage(err.to_string()))
        .and_then(|encoded| store.set(key, encoded));
    if let Err(err) = result {
        warn!(key, error = %err, "failed to persist value");
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, ChatError> {
        self.entries
            .lock()
            .map_err(|_| ChatError::Storage("memory store poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, ChatError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ChatError> {
        self.entries()?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ChatError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// One pretty-printed JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under the platform data directory.
    pub fn open_default() -> Result<Self, ChatError> {
        let dirs = project_dirs().ok_or_else(|| {
            ChatError::Storage("failed to determine data directory".to_string())
        })?;
        Ok(Self::new(dirs.data_dir()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ChatError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ChatError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn io_error(path: &Path, err: impl std::fmt::Display) -> ChatError {
    ChatError::Storage(format!("{}: {err}", path.display()))
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, ChatError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(|err| io_error(&path, err))?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|err| io_error(&path, err))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ChatError> {
        let path = self.path_for(key)?;
        let contents =
            serde_json::to_string_pretty(&value).map_err(|err| io_error(&path, err))?;
        write_atomic(&path, contents.as_bytes()).map_err(|err| io_error(&path, err))
    }

    fn remove(&self, key: &str) -> Result<(), ChatError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&path, err)),
        }
    }
}
