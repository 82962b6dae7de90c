//! Cache storage backends

use crate::error::OrchestrationError;
use crate::keys::sha256_hex;
use crate::models::CacheEntry;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Raw entry storage. Expiry is the cache's concern, not the backend's.
pub trait CacheBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>>;
    fn store(&self, key: &str, entry: CacheEntry) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

//
// ================= Memory =================
//

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        // Entries are replaced wholesale, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl CacheBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries().get(key).cloned())
    }

    fn store(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries().insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries().keys().cloned().collect())
    }
}

//
// ================= File =================
//

/// On-disk record. The key is kept alongside the entry because file names
/// are hashes.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    entry: CacheEntry,
}

/// Durable backend: one JSON file per key under `root`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sha256_hex(key)))
    }

    fn read(path: &Path) -> Result<StoredEntry> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            OrchestrationError::parse(format!("corrupt cache file {}: {}", path.display(), e))
        })
    }
}

impl CacheBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let stored = Self::read(&path)?;
        // Hash collision or a stray file: treat as a miss
        if stored.key != key {
            return Ok(None);
        }
        Ok(Some(stored.entry))
    }

    fn store(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let record = StoredEntry {
            key: key.to_string(),
            entry,
        };
        fs::write(&tmp, serde_json::to_vec(&record)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(stored) = Self::read(&path) {
                keys.push(stored.key);
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn entry(value: serde_json::Value) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            value,
            cached_at: now,
            expires_at: now + chrono::Duration::seconds(60),
        }
    }

    #[test]
    fn test_file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = FileBackend::new(dir.path()).unwrap();
            backend.store("crypto:ids=bitcoin", entry(json!({"btc": 1}))).unwrap();
        }

        let reopened = FileBackend::new(dir.path()).unwrap();
        let loaded = reopened.load("crypto:ids=bitcoin").unwrap().unwrap();
        assert_eq!(loaded.value, json!({"btc": 1}));
        assert_eq!(reopened.keys().unwrap(), vec!["crypto:ids=bitcoin".to_string()]);
    }

    #[test]
    fn test_file_backend_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();
        backend.store("news:q=ai", entry(json!([]))).unwrap();

        backend.remove("news:q=ai").unwrap();
        backend.remove("news:q=ai").unwrap();
        assert!(backend.load("news:q=ai").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();
        fs::write(backend.path_for("k"), b"not json").unwrap();

        assert!(backend.load("k").is_err());
        assert!(backend.keys().unwrap().is_empty());
    }
}
