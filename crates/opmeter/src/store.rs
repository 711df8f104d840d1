//! Persistence of metric records
//!
//! [`MetricsStore`] keeps records under string keys, typically a baseline
//! name such as `main` or `before-index`. Two backends:
//! - [`MemoryStore`] for tests and short-lived processes
//! - [`FileStore`], one pretty-printed JSON file per key

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::error::{MetricsError, Result};
use crate::record::MetricRecord;

/// Key-value storage for metric records
pub trait MetricsStore: Send + Sync {
    /// Store `record` under `key`, replacing any previous record
    fn save(&self, key: &str, record: &MetricRecord) -> Result<()>;

    /// Fetch the record stored under `key`
    fn load(&self, key: &str) -> Result<Option<MetricRecord>>;

    /// Remove `key`. Returns true if something was removed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// All stored keys
    fn keys(&self) -> Result<Vec<String>>;
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(MetricsError::InvalidOperation(
            "store key must not be empty".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// In-memory store
// ============================================================================

/// Store backed by an insertion-ordered map
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<IndexMap<String, MetricRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl MetricsStore for MemoryStore {
    fn save(&self, key: &str, record: &MetricRecord) -> Result<()> {
        validate_key(key)?;
        self.records.write().insert(key.to_string(), record.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<MetricRecord>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.records.write().shift_remove(key).is_some())
    }

    /// Keys in insertion order
    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.records.read().keys().cloned().collect())
    }
}

// ============================================================================
// File store
// ============================================================================

/// Store writing `<dir>/<key>.json`
///
/// Characters outside `[A-Za-z0-9_.-]` in a key are replaced with `_`, so
/// `feature/login` and `feature_login` share a file.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_dir`. The directory is created on the
    /// first save.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Store in `.opmeter` under the current directory
    pub fn default_store() -> Self {
        Self::new(".opmeter")
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// File name component for `key`
    pub fn sanitize_key(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        let name = Self::sanitize_key(key);
        // "." and ".." survive sanitizing but would escape the file name
        if name.chars().all(|c| c == '.') {
            return Err(MetricsError::InvalidOperation(format!(
                "store key '{}' is not a valid file name",
                key
            )));
        }
        Ok(self.base_dir.join(format!("{}.json", name)))
    }
}

impl MetricsStore for FileStore {
    #[instrument(skip(self, record), fields(dir = %self.base_dir.display()))]
    fn save(&self, key: &str, record: &MetricRecord) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.base_dir)?;

        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)?;

        debug!(path = %path.display(), "record saved");
        Ok(())
    }

    #[instrument(skip(self), fields(dir = %self.base_dir.display()))]
    fn load(&self, key: &str) -> Result<Option<MetricRecord>> {
        let path = self.path_for(key)?;
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record = serde_json::from_str(&json)?;
        debug!(path = %path.display(), "record loaded");
        Ok(Some(record))
    }

    #[instrument(skip(self), fields(dir = %self.base_dir.display()))]
    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "record deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Sanitized keys, sorted
    fn keys(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryStats;
    use tempfile::TempDir;

    fn sample() -> MetricRecord {
        MetricRecord::new("checkout", 0.42)
            .with_phase("validate", 0.1)
            .with_memory(MemoryStats::new(2_097_152, 3_145_728, 1_048_576))
            .with_count("rows", 12)
    }

    #[test]
    fn test_memory_store_crud() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.save("main", &sample()).unwrap();
        store.save("feature", &MetricRecord::new("checkout", 0.3)).unwrap();
        store.save("main", &MetricRecord::new("checkout", 0.5)).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.keys().unwrap(), vec!["main", "feature"]);
        assert_eq!(store.load("main").unwrap().unwrap().total, 0.5);
        assert!(store.load("missing").unwrap().is_none());

        assert!(store.delete("main").unwrap());
        assert!(!store.delete("main").unwrap());
        assert_eq!(store.keys().unwrap(), vec!["feature"]);
    }

    #[test]
    fn test_empty_key_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.save("", &sample()),
            Err(MetricsError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("baselines"));
        assert!(store.keys().unwrap().is_empty());

        store.save("main", &sample()).unwrap();
        let loaded = store.load("main").unwrap().unwrap();

        assert_eq!(loaded.operation, "checkout");
        assert_eq!(loaded.phases["validate"], 0.1);
        assert_eq!(loaded.counts["rows"], 12);
        assert_eq!(loaded.memory.unwrap().delta_mb, 1.0);
        assert!(dir.path().join("baselines").join("main.json").exists());
    }

    #[test]
    fn test_file_store_keys_sorted_and_sanitized() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        store.save("zeta", &sample()).unwrap();
        store.save("feature/login v2", &sample()).unwrap();
        store.save("alpha", &sample()).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(
            store.keys().unwrap(),
            vec!["alpha", "feature_login_v2", "zeta"]
        );
        assert!(store.load("feature/login v2").unwrap().is_some());
        assert!(store.load("feature_login_v2").unwrap().is_some());
    }

    #[test]
    fn test_file_store_delete_and_missing() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        assert!(store.load("nothing").unwrap().is_none());
        assert!(!store.delete("nothing").unwrap());

        store.save("main", &sample()).unwrap();
        assert!(store.delete("main").unwrap());
        assert!(store.load("main").unwrap().is_none());
    }

    #[test]
    fn test_file_store_rejects_dot_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.save("..", &sample()).is_err());
        assert!(store.save("", &sample()).is_err());
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        assert!(matches!(
            store.load("broken"),
            Err(MetricsError::Serialization(_))
        ));
    }

    #[test]
    fn test_stores_as_trait_objects() {
        let dir = TempDir::new().unwrap();
        let stores: Vec<Box<dyn MetricsStore>> =
            vec![Box::new(MemoryStore::new()), Box::new(FileStore::new(dir.path()))];

        for store in &stores {
            store.save("k", &sample()).unwrap();
            assert_eq!(store.keys().unwrap(), vec!["k"]);
        }
    }
}
