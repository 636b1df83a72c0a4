//! Atomic JSON document store.
//!
//! Each memory kind persists one JSON document in its own file
//! (`regulatory-decisions.json`, `task-patterns.json`, ...). The discipline
//! shared by all of them lives here:
//!
//! - loads treat a missing or unparsable file as an empty document — memory
//!   loss must never crash the surrounding session;
//! - saves write a `.tmp` sibling and rename it into place, so a crash
//!   mid-write leaves the previous document intact;
//! - a per-store [`Mutex`] serializes whole load-mutate-save cycles within
//!   one process.
//!
//! Known limitation: there is no cross-process file locking. Two processes
//! writing the same file can race past the atomic-rename point and clobber
//! each other's update.

use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{MemoryError, Result};

/// Handle to one JSON document on disk.
pub struct DocumentStore {
    path: PathBuf,
    schema_path: PathBuf,
    lock: Mutex<()>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DocumentStore {
    /// Open a store for the document at `path`, creating the parent
    /// directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Io`] if the parent directory cannot be created.
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let parent = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        std::fs::create_dir_all(&parent)?;

        let stem = path
            .file_stem()
            .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
        let schema_path = parent
            .join(&config.schema_dir)
            .join(format!("{stem}-schema.json"));

        info!(path = %path.display(), "Document store opened");

        Ok(Self {
            path,
            schema_path,
            lock: Mutex::new(()),
        })
    }

    /// Path to the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last successfully saved document.
    ///
    /// A missing, unreadable, or unparsable file yields `T::default()` —
    /// corruption is "start fresh", never a fatal error. The next successful
    /// save self-heals the file.
    #[must_use]
    pub fn load<T: Default + DeserializeOwned>(&self) -> T {
        let _guard = self.lock.lock();
        self.load_unlocked()
    }

    /// Save a document atomically.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Serialization`] if encoding fails, or
    /// [`MemoryError::Io`] if the write or rename fails. The temp file is
    /// removed on failure and the previous document is left untouched.
    pub fn save<T: Serialize>(&self, document: &T) -> Result<()> {
        let _guard = self.lock.lock();
        self.save_unlocked(document)
    }

    /// Run a load-mutate-save cycle under the store lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the final save fails; the closure's in-memory
    /// changes are discarded in that case.
    pub fn update<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R>
    where
        T: Default + DeserializeOwned + Serialize,
    {
        let _guard = self.lock.lock();
        let mut document: T = self.load_unlocked();
        let result = f(&mut document);
        self.save_unlocked(&document)?;
        Ok(result)
    }

    /// Like [`update`](Self::update), but the closure decides whether the
    /// document is persisted: it returns `(result, dirty)` and nothing is
    /// written when `dirty` is false.
    ///
    /// # Errors
    ///
    /// Returns an error if a requested save fails.
    pub fn update_if<T, R>(&self, f: impl FnOnce(&mut T) -> (R, bool)) -> Result<R>
    where
        T: Default + DeserializeOwned + Serialize,
    {
        let _guard = self.lock.lock();
        let mut document: T = self.load_unlocked();
        let (result, dirty) = f(&mut document);
        if dirty {
            self.save_unlocked(&document)?;
        }
        Ok(result)
    }

    /// Validate a document's structure.
    ///
    /// The minimal requirement is a top-level object with a `version` key.
    /// If a sibling `schemas/<stem>-schema.json` exists, the document must
    /// additionally contain every property named in the schema's top-level
    /// `required` array. A missing schema file is not a validation failure;
    /// an unparsable one is.
    #[must_use]
    pub fn validate(&self, document: &Value) -> bool {
        let Some(object) = document.as_object() else {
            return false;
        };
        if !object.contains_key("version") {
            return false;
        }

        if !self.schema_path.exists() {
            return true;
        }

        let schema: Value = match std::fs::read_to_string(&self.schema_path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
        {
            Ok(schema) => schema,
            Err(error) => {
                warn!(
                    schema = %self.schema_path.display(),
                    %error,
                    "Unreadable schema file — treating document as invalid"
                );
                return false;
            }
        };

        schema
            .get("required")
            .and_then(Value::as_array)
            .is_none_or(|required| {
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .all(|key| object.contains_key(key))
            })
    }

    // ------------------------------------------------------------------
    // Lock-free internals (callers hold the lock)
    // ------------------------------------------------------------------

    fn load_unlocked<T: Default + DeserializeOwned>(&self) -> T {
        let start = Instant::now();
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), %error, "Unreadable document — starting fresh");
                }
                return T::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(document) => {
                debug!(
                    path = %self.path.display(),
                    bytes = bytes.len(),
                    elapsed_us = start.elapsed().as_micros(),
                    "Loaded document"
                );
                document
            }
            Err(error) => {
                warn!(path = %self.path.display(), %error, "Corrupt document — starting fresh");
                T::default()
            }
        }
    }

    fn save_unlocked<T: Serialize>(&self, document: &T) -> Result<()> {
        let start = Instant::now();
        let json = serde_json::to_vec_pretty(document)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;

        let temp_path = self.path.with_extension("tmp");
        let written = std::fs::write(&temp_path, &json)
            .and_then(|()| std::fs::rename(&temp_path, &self.path));

        if let Err(error) = written {
            let _ = std::fs::remove_file(&temp_path);
            warn!(path = %self.path.display(), %error, "Save failed — previous document retained");
            return Err(MemoryError::Io(error));
        }

        debug!(
            path = %self.path.display(),
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved document"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct TestDocument {
        version: String,
        entries: Vec<String>,
    }

    fn store_in(dir: &Path) -> DocumentStore {
        DocumentStore::open(dir.join("test-doc.json"), &StoreConfig::default()).expect("open")
    }

    #[test]
    fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let doc: TestDocument = store.load();
        assert_eq!(doc, TestDocument::default());
    }

    #[test]
    fn round_trip_save_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let doc = TestDocument {
            version: "1.0.0".to_string(),
            entries: vec!["alpha".to_string(), "beta".to_string()],
        };

        store.save(&doc).expect("save");
        let loaded: TestDocument = store.load();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn corrupt_file_loads_as_default_and_next_save_heals() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        std::fs::write(store.path(), b"{ truncated garba").expect("write");

        let loaded: TestDocument = store.load();
        assert_eq!(loaded, TestDocument::default());

        let doc = TestDocument {
            version: "1.0.0".to_string(),
            entries: vec![],
        };
        store.save(&doc).expect("save");
        let healed: TestDocument = store.load();
        assert_eq!(healed, doc);
    }

    #[test]
    fn interrupted_save_leaves_previous_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let doc = TestDocument {
            version: "1.0.0".to_string(),
            entries: vec!["survivor".to_string()],
        };
        store.save(&doc).expect("save");

        // Simulate a crash after the temp file was written but before the
        // rename: a stale .tmp sibling must not affect loads.
        let temp = store.path().with_extension("tmp");
        std::fs::write(&temp, b"{ \"version\": \"9\", \"entries\": [ half").expect("write tmp");

        let loaded: TestDocument = store.load();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn update_returns_closure_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());

        let count = store
            .update(|doc: &mut TestDocument| {
                doc.version = "1.0.0".to_string();
                doc.entries.push("one".to_string());
                doc.entries.len()
            })
            .expect("update");
        assert_eq!(count, 1);

        let loaded: TestDocument = store.load();
        assert_eq!(loaded.entries, vec!["one".to_string()]);
    }

    #[test]
    fn update_if_skips_save_when_clean() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());

        store
            .update_if(|doc: &mut TestDocument| {
                doc.entries.push("discarded".to_string());
                ((), false)
            })
            .expect("update_if");

        assert!(!store.path().exists(), "clean update must not create the file");
    }

    #[test]
    fn validate_requires_version_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());

        assert!(store.validate(&json!({"version": "1.0.0"})));
        assert!(!store.validate(&json!({"no_version": true})));
        assert!(!store.validate(&json!(["not", "an", "object"])));
    }

    #[test]
    fn validate_checks_schema_required_keys_when_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());

        let schema_dir = dir.path().join("schemas");
        std::fs::create_dir_all(&schema_dir).expect("mkdir");
        std::fs::write(
            schema_dir.join("test-doc-schema.json"),
            serde_json::to_vec(&json!({"required": ["version", "entries"]})).expect("encode"),
        )
        .expect("write schema");

        assert!(store.validate(&json!({"version": "1.0.0", "entries": []})));
        assert!(!store.validate(&json!({"version": "1.0.0"})));
    }

    #[test]
    fn validate_rejects_unparsable_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());

        let schema_dir = dir.path().join("schemas");
        std::fs::create_dir_all(&schema_dir).expect("mkdir");
        std::fs::write(schema_dir.join("test-doc-schema.json"), b"nope").expect("write schema");

        assert!(!store.validate(&json!({"version": "1.0.0"})));
    }

    #[test]
    fn save_failure_removes_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Point the store at a path whose parent is a file, so the write of
        // the temp sibling fails.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").expect("write blocker");
        let store = DocumentStore {
            path: blocker.join("doc.json"),
            schema_path: dir.path().join("schemas").join("doc-schema.json"),
            lock: Mutex::new(()),
        };

        let doc = TestDocument::default();
        assert!(store.save(&doc).is_err());
        assert!(!blocker.join("doc.tmp").exists());
    }
}
