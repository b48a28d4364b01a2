//! Key/value persistence for client state.
//!
//! The registry keeps its whole drink list as one JSON string under a single
//! key, so a store only needs to get and set strings.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// A string key/value store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Store that keeps values in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with one value.
    pub fn with_value(key: &str, value: impl Into<String>) -> Self {
        let store = Self::new();
        store.values.write().insert(key.to_string(), value.into());
        store
    }

    /// Synchronous peek, handy for inspecting state in tests.
    pub fn snapshot(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Store that keeps one file per key inside a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir` for storage. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File used for `key`.
    ///
    /// Keys like `@drinks` map to `drinks.json`; characters that are unsafe
    /// in file names are replaced with `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .trim_start_matches('@')
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let name = if name.is_empty() { "_".to_string() } else { name };
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                trace!("Read {} bytes from {:?}", contents.len(), path);
                Ok(Some(contents))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage {
                reason: format!("reading {:?}: {}", path, e),
            }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Persisted {} bytes to {:?}", value.len(), path);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("@drinks").await.unwrap(), None);

        store.set("@drinks", "[]").await.unwrap();
        assert_eq!(store.get("@drinks").await.unwrap().as_deref(), Some("[]"));
        assert_eq!(store.snapshot("@drinks").as_deref(), Some("[]"));

        store.remove("@drinks").await.unwrap();
        store.remove("@drinks").await.unwrap();
        assert_eq!(store.get("@drinks").await.unwrap(), None);
    }

    #[test]
    fn test_memory_store_seeded() {
        let store = MemoryStore::with_value("@drinks", "[]");
        let value = tokio_test::assert_ok!(tokio_test::block_on(store.get("@drinks")));
        assert_eq!(value.as_deref(), Some("[]"));
        assert_eq!(store.snapshot("other"), None);
    }

    #[test]
    fn test_file_names() {
        let store = FileStore::new("/data");
        assert_eq!(store.path_for("@drinks"), PathBuf::from("/data/drinks.json"));
        assert_eq!(store.path_for("a/b c"), PathBuf::from("/data/a_b_c.json"));
        assert_eq!(store.path_for("@"), PathBuf::from("/data/_.json"));
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert_eq!(store.get("@drinks").await.unwrap(), None);

        store.set("@drinks", r#"[{"uid":"A"}]"#).await.unwrap();
        store.set("@drinks", r#"[{"uid":"B"}]"#).await.unwrap();
        assert_eq!(
            store.get("@drinks").await.unwrap().as_deref(),
            Some(r#"[{"uid":"B"}]"#)
        );
        assert!(!store.path_for("@drinks").with_extension("json.tmp").exists());

        store.remove("@drinks").await.unwrap();
        assert_eq!(store.get("@drinks").await.unwrap(), None);
    }
}
