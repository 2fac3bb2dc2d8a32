//! Key-value persistence
//!
//! State is persisted as whole snapshots under two keys:
//! - `collection` - the ticket collection, including the product mapping
//! - `raw_texts` - the raw text archive used by migrations
//!
//! `FileStore` keeps one JSON file per key in the data directory and replaces
//! it atomically. `MemoryStore` backs tests and can simulate a full quota.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Collection;

pub const COLLECTION_KEY: &str = "collection";
pub const RAW_TEXTS_KEY: &str = "raw_texts";

/// Receipt id -> original extracted text
///
/// Entries are write-once: an id that is already archived keeps its text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTextArchive {
    texts: BTreeMap<String, String>,
}

impl RawTextArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive a text, returning false if the id was already present
    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) -> bool {
        let id = id.into();
        if self.texts.contains_key(&id) {
            return false;
        }
        self.texts.insert(id, text.into());
        true
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.texts.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.texts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.texts.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Trait for persistence backends
///
/// Values are opaque strings. Typed snapshot helpers are provided on top.
pub trait KeyValueStore: Send + Sync {
    /// Human-readable name for this backend
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Result<Option<String>>;

    fn put(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Load the stored collection, if any
    fn load_collection(&self) -> Result<Option<Collection>> {
        match self.get(COLLECTION_KEY)? {
            Some(content) => Ok(Some(Collection::from_json(&content)?)),
            None => Ok(None),
        }
    }

    fn save_collection(&self, collection: &Collection) -> Result<()> {
        self.put(COLLECTION_KEY, &serde_json::to_string(collection)?)
    }

    /// Load the raw text archive, empty when nothing is stored
    fn load_raw_texts(&self) -> Result<RawTextArchive> {
        match self.get(RAW_TEXTS_KEY)? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(RawTextArchive::default()),
        }
    }

    fn save_raw_texts(&self, archive: &RawTextArchive) -> Result<()> {
        self.put(RAW_TEXTS_KEY, &serde_json::to_string(archive)?)
    }
}

/// One JSON file per key inside a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::Storage(format!(
                    "Failed to create data directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            debug!("Created data directory: {}", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::Storage(format!("Invalid storage key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        // Write next to the target so the rename stays on one filesystem
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path).map_err(|e| {
            Error::Storage(format!("Failed to write {}: {}", path.display(), e.error))
        })?;
        debug!("Wrote {} ({} bytes)", path.display(), value.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// In-memory store with an optional byte quota
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes once the stored bytes would exceed `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: Mutex::default(),
            quota: Some(bytes),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock()?;
        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if others + value.len() > quota {
                return Err(Error::Storage(format!(
                    "Quota exceeded writing {} ({} of {} bytes)",
                    key,
                    others + value.len(),
                    quota
                )));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_archive_is_write_once() {
        let mut archive = RawTextArchive::new();
        assert!(archive.insert("1-2-3", "first"));
        assert!(!archive.insert("1-2-3", "second"));
        assert_eq!(archive.get("1-2-3"), Some("first"));
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn test_archive_serializes_as_plain_map() {
        let mut archive = RawTextArchive::new();
        archive.insert("a", "text");
        assert_eq!(serde_json::to_string(&archive).unwrap(), r#"{"a":"text"}"#);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("nested")).unwrap();
        assert_eq!(store.get("collection").unwrap(), None);

        store.put("collection", "{}").unwrap();
        store.put("collection", "{\"tickets\":[]}").unwrap();
        assert_eq!(
            store.get("collection").unwrap().as_deref(),
            Some("{\"tickets\":[]}")
        );
        assert!(dir.path().join("nested/collection.json").exists());

        store.remove("collection").unwrap();
        assert_eq!(store.get("collection").unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(store.put("../escape", "x").is_err());
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::with_quota(10);
        store.put("a", "12345").unwrap();
        store.put("a", "1234567890").unwrap();
        assert!(matches!(store.put("b", "1"), Err(Error::Storage(_))));
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn test_snapshot_helpers() {
        let store = MemoryStore::new();
        assert!(store.load_collection().unwrap().is_none());
        assert!(store.load_raw_texts().unwrap().is_empty());

        let collection = Collection::default();
        store.save_collection(&collection).unwrap();
        assert_eq!(store.load_collection().unwrap(), Some(collection));
    }
}
