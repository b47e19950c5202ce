//! Durable key/value storage backing the session manager.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode session store: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// String key/value storage. `apply` writes and removes several keys as one
/// mutation; backends must not expose a state where only part of it landed.
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn apply(&mut self, set: &[(&str, &str)], remove: &[&str]) -> Result<(), StoreError>;

    async fn set_many(&mut self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        self.apply(entries, &[]).await
    }

    async fn remove_many(&mut self, keys: &[&str]) -> Result<(), StoreError> {
        self.apply(&[], keys).await
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.apply(&[(key, value)], &[]).await
    }

    async fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.apply(&[], &[key]).await
    }
}

fn apply_to(
    entries: &mut HashMap<String, String>,
    set: &[(&str, &str)],
    remove: &[&str],
) -> bool {
    let mut changed = false;
    for key in remove {
        changed |= entries.remove(*key).is_some();
    }
    for (key, value) in set {
        let previous = entries.insert((*key).to_string(), (*value).to_string());
        changed |= previous.as_deref() != Some(*value);
    }
    changed
}

/// In-process store; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    async fn apply(&mut self, set: &[(&str, &str)], remove: &[&str]) -> Result<(), StoreError> {
        apply_to(&mut self.entries, set, remove);
        Ok(())
    }
}

/// JSON file store. Every mutation rewrites the file via a temp file and
/// rename, so readers never observe a partially written map.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`. A missing, empty or unreadable-as-JSON file
    /// starts an empty store; the next write replaces a corrupt file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let entries = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Session file is corrupt, starting with an empty session"
                );
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened session store");

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".session-")
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[async_trait]
impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    async fn apply(&mut self, set: &[(&str, &str)], remove: &[&str]) -> Result<(), StoreError> {
        let previous = self.entries.clone();

        if !apply_to(&mut self.entries, set, remove) {
            return Ok(());
        }
        if let Err(e) = self.persist().await {
            self.entries = previous;
            return Err(e);
        }
        Ok(())
    }
}
