use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Key-value persistence for session data, shaped like browser localStorage
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Delete a value; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// Write several values as one operation. Stores that can should apply
    /// all of them or none.
    async fn set_many(&self, entries: Vec<(&str, String)>) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }
}

/// In-memory store, for tests and sessions that should not outlive the process
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently held
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(&str, String)>) -> Result<()> {
        let mut map = self.entries.write().await;
        for (key, value) in entries {
            map.insert(key.to_string(), value);
        }
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// The whole file is loaded on open and rewritten after every mutation.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if fs::try_exists(&path).await? {
            let raw = fs::read_to_string(&path).await?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    error!(error = %e, path = %path.display(), "Session file is corrupt");
                    anyhow!("Failed to parse session file {}: {}", path.display(), e)
                })?
            }
        } else {
            debug!(path = %path.display(), "No session file yet, starting empty");
            BTreeMap::new()
        };

        info!(path = %path.display(), keys = entries.len(), "Opened session store");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let serialized = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, serialized).await.map_err(|e| {
            error!(error = %e, path = %self.path.display(), "Failed to save session file");
            anyhow!("Failed to save session file {}: {}", self.path.display(), e)
        })
    }

    /// Apply `change` to a copy, persist it, and only then make it visible.
    /// `change` returns whether anything changed.
    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool + Send,
    {
        // The write lock is held across the save so file writes stay ordered
        let mut entries = self.entries.write().await;
        let mut updated = entries.clone();
        if !change(&mut updated) {
            return Ok(());
        }
        self.save(&updated).await?;
        *entries = updated;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.set_many(vec![(key, value)]).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some()).await
    }

    async fn set_many(&self, pairs: Vec<(&str, String)>) -> Result<()> {
        self.update(|entries| {
            for (key, value) in pairs {
                entries.insert(key.to_string(), value);
            }
            true
        })
        .await
    }
}
