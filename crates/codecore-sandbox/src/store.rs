//! Persisted editor state
//!
//! The last saved source text and selection live in a flat string map under
//! two keys. The format is unversioned.

use crate::error::StoreError;
use async_trait::async_trait;
use codecore_profile::Selection;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Flat string key/value storage
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Keys the editor state is stored under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    /// Key of the source text
    pub code_key: String,
    /// Key of the selection
    pub framework_key: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            code_key: "codecore_code".to_string(),
            framework_key: "codecore_framework".to_string(),
        }
    }
}

/// Source text and selection the user is working with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorState {
    /// Current editor text
    pub source: String,
    /// Current profile selection
    pub selection: Selection,
}

impl EditorState {
    /// Create state
    #[must_use]
    pub fn new(source: impl Into<String>, selection: Selection) -> Self {
        Self {
            source: source.into(),
            selection,
        }
    }

    /// Persist source and selection
    pub async fn save(&self, store: &dyn StateStore, keys: &StorageKeys) -> Result<(), StoreError> {
        store.set(&keys.code_key, &self.source).await?;
        store
            .set(&keys.framework_key, &self.selection.to_string())
            .await?;
        tracing::debug!(bytes = self.source.len(), selection = %self.selection, "editor state saved");
        Ok(())
    }

    /// Read the saved state
    ///
    /// Returns `None` when no source was saved. A saved source without a
    /// saved selection restores with `auto`.
    pub async fn restore(
        store: &dyn StateStore,
        keys: &StorageKeys,
    ) -> Result<Option<Self>, StoreError> {
        let Some(source) = store.get(&keys.code_key).await? else {
            return Ok(None);
        };
        let selection = store
            .get(&keys.framework_key)
            .await?
            .map(Selection::from)
            .unwrap_or_default();
        Ok(Some(Self { source, selection }))
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store keeping a JSON object of strings in one file
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Create store backed by `path`; the file is created on first write
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value.to_string());
        let bytes = serde_json::to_vec_pretty(&values)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}
