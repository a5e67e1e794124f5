//! Persisted per-extension records.
//!
//! An invocation result carrying a `db` field upserts that value under the
//! extension's name; a result without one clears the record. The record is
//! handed back to the extension as `context.db` on its next run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::error::{ExtensionError, ExtensionResult};
use super::invoke::InvocationResult;

/// Key-value store keyed by extension name.
pub trait PersistenceStore: Send {
    fn get(&self, extension: &str) -> ExtensionResult<Option<Value>>;
    fn upsert(&mut self, extension: &str, value: Value) -> ExtensionResult<()>;
    fn clear(&mut self, extension: &str) -> ExtensionResult<()>;
}

/// Apply the persistence directive carried by `result`.
///
/// Must run after the invocation resolved, exactly once per success.
pub fn apply_persistence(
    store: &mut dyn PersistenceStore,
    extension: &str,
    result: &InvocationResult,
) -> ExtensionResult<()> {
    match result.db() {
        Some(db) => store.upsert(extension, db.clone()),
        None => store.clear(extension),
    }
}

/// Store backed by a single JSON file.
///
/// Records are cached in memory and the file is rewritten on every change.
/// Writing an identical value or clearing an absent record leaves the file
/// untouched.
pub struct JsonFileStore {
    /// Path to the storage file.
    path: PathBuf,
    /// In-memory cache of stored records.
    cache: BTreeMap<String, Value>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing records.
    ///
    /// A missing file is an empty store; an unreadable or corrupt one is an
    /// error rather than silently discarded data.
    pub fn open(path: impl Into<PathBuf>) -> ExtensionResult<Self> {
        let path = path.into();

        let cache = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| store_error(&path, e))?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| store_error(&path, e))?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, cache })
    }

    /// Default location: `<data dir>/rung/db.json`.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("rung")
            .join("db.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> Vec<String> {
        self.cache.keys().cloned().collect()
    }

    fn flush(&self, extension: &str) -> ExtensionResult<()> {
        let persistence_error = |message: String| ExtensionError::Persistence {
            extension: extension.to_string(),
            message,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    persistence_error(format!(
                        "Failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let contents = serde_json::to_string_pretty(&self.cache)
            .map_err(|e| persistence_error(e.to_string()))?;
        fs::write(&self.path, contents).map_err(|e| {
            persistence_error(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}

fn store_error(path: &Path, error: impl std::fmt::Display) -> ExtensionError {
    ExtensionError::Source {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

impl PersistenceStore for JsonFileStore {
    fn get(&self, extension: &str) -> ExtensionResult<Option<Value>> {
        Ok(self.cache.get(extension).cloned())
    }

    fn upsert(&mut self, extension: &str, value: Value) -> ExtensionResult<()> {
        if self.cache.get(extension) == Some(&value) {
            return Ok(());
        }
        let previous = self.cache.insert(extension.to_string(), value);
        if let Err(e) = self.flush(extension) {
            // Keep memory consistent with disk.
            match previous {
                Some(previous) => self.cache.insert(extension.to_string(), previous),
                None => self.cache.remove(extension),
            };
            return Err(e);
        }
        Ok(())
    }

    fn clear(&mut self, extension: &str) -> ExtensionResult<()> {
        if let Some(previous) = self.cache.remove(extension) {
            if let Err(e) = self.flush(extension) {
                self.cache.insert(extension.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Volatile store, used when no persistence is wanted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, Value>,
}

impl PersistenceStore for MemoryStore {
    fn get(&self, extension: &str) -> ExtensionResult<Option<Value>> {
        Ok(self.records.get(extension).cloned())
    }

    fn upsert(&mut self, extension: &str, value: Value) -> ExtensionResult<()> {
        self.records.insert(extension.to_string(), value);
        Ok(())
    }

    fn clear(&mut self, extension: &str) -> ExtensionResult<()> {
        self.records.remove(extension);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingStore {
        calls: Vec<String>,
    }

    impl PersistenceStore for RecordingStore {
        fn get(&self, _extension: &str) -> ExtensionResult<Option<Value>> {
            Ok(None)
        }

        fn upsert(&mut self, extension: &str, value: Value) -> ExtensionResult<()> {
            self.calls.push(format!("upsert {} {}", extension, value));
            Ok(())
        }

        fn clear(&mut self, extension: &str) -> ExtensionResult<()> {
            self.calls.push(format!("clear {}", extension));
            Ok(())
        }
    }

    struct FailingStore;

    impl PersistenceStore for FailingStore {
        fn get(&self, _extension: &str) -> ExtensionResult<Option<Value>> {
            Ok(None)
        }

        fn upsert(&mut self, extension: &str, _value: Value) -> ExtensionResult<()> {
            Err(ExtensionError::Persistence {
                extension: extension.to_string(),
                message: "disk full".to_string(),
            })
        }

        fn clear(&mut self, _extension: &str) -> ExtensionResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_result_without_db_clears() {
        let mut store = RecordingStore::default();
        let result = InvocationResult {
            value: json!({ "alerts": [] }),
        };

        apply_persistence(&mut store, "ext-name", &result).unwrap();
        assert_eq!(store.calls, vec!["clear ext-name"]);
    }

    #[test]
    fn test_result_with_db_upserts() {
        let mut store = RecordingStore::default();
        let result = InvocationResult {
            value: json!({ "db": { "x": 1 } }),
        };

        apply_persistence(&mut store, "ext-name", &result).unwrap();
        assert_eq!(store.calls, vec![r#"upsert ext-name {"x":1}"#]);
    }

    #[test]
    fn test_non_object_results_clear() {
        let mut store = RecordingStore::default();
        for value in [json!("alert"), json!(null), json!([{ "db": 1 }])] {
            apply_persistence(&mut store, "ext", &InvocationResult { value }).unwrap();
        }
        assert_eq!(store.calls, vec!["clear ext", "clear ext", "clear ext"]);
    }

    #[test]
    fn test_store_failure_is_reported() {
        let result = InvocationResult {
            value: json!({ "db": 1 }),
        };
        let err = apply_persistence(&mut FailingStore, "ext-name", &result).unwrap_err();
        assert_eq!(err.category(), "persistence");
    }

    #[test]
    fn test_json_store_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("db.json");

        {
            let mut store = JsonFileStore::open(&path).unwrap();
            store.upsert("weather", json!({ "last": 30 })).unwrap();
            store.upsert("news", json!([1, 2])).unwrap();
        }

        let mut store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("weather").unwrap(), Some(json!({ "last": 30 })));
        assert_eq!(store.keys(), vec!["news", "weather"]);

        store.clear("news").unwrap();
        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("news").unwrap(), None);
    }

    #[test]
    fn test_unchanged_records_do_not_rewrite_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        store.clear("absent").unwrap();
        assert!(!path.exists());

        store.upsert("ext", json!(1)).unwrap();
        fs::write(&path, "{\"ext\": 1, \"marker\": true}").unwrap();
        store.upsert("ext", json!(1)).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("marker"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");
        fs::write(&path, "not json").unwrap();

        assert!(JsonFileStore::open(&path).is_err());
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::default();
        store.upsert("a", json!(1)).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!(1)));
        store.clear("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }
}
