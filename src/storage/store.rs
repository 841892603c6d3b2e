//! Index store abstraction.
//!
//! Reads treat anything unusable (missing half, corrupt bytes) as a cache
//! miss. Writes replace both artifacts of a document at once.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::PathBuf;

use super::error::StorageResult;
use super::persistence::{IndexPersistence, StoredIndex};

/// Persistent storage of one index per document id.
pub trait IndexStore: Send + Sync {
    /// Load a document's index. `None` on miss or unreadable artifacts.
    fn load(&self, document_id: &str) -> Option<StoredIndex>;

    /// Replace a document's index.
    fn replace(&self, stored: &StoredIndex) -> StorageResult<()>;

    /// Delete a document's index. Returns whether one existed.
    fn delete(&self, document_id: &str) -> StorageResult<bool>;

    /// Document ids with a stored index, sorted.
    fn list(&self) -> StorageResult<Vec<String>>;
}

/// Directory-backed store.
#[derive(Debug)]
pub struct FileIndexStore {
    persistence: IndexPersistence,
    // Serializes writers; readers only see completed renames.
    write_lock: Mutex<()>,
}

impl FileIndexStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            persistence: IndexPersistence::new(base_path),
            write_lock: Mutex::new(()),
        }
    }

    pub fn persistence(&self) -> &IndexPersistence {
        &self.persistence
    }
}

impl IndexStore for FileIndexStore {
    fn load(&self, document_id: &str) -> Option<StoredIndex> {
        match self.persistence.load(document_id) {
            Ok(stored) => Some(stored),
            Err(e) if e.is_cache_miss() => {
                if !matches!(e, super::StorageError::NotFound(_)) {
                    tracing::warn!(target: "storage", "ignoring unreadable index {document_id}: {e}");
                }
                None
            }
            Err(e) => {
                tracing::warn!(target: "storage", "failed to load index {document_id}: {e}");
                None
            }
        }
    }

    fn replace(&self, stored: &StoredIndex) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        self.persistence.save(stored)
    }

    fn delete(&self, document_id: &str) -> StorageResult<bool> {
        let _guard = self.write_lock.lock();
        self.persistence.remove(document_id)
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        self.persistence.list()
    }
}

/// In-process store, for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryIndexStore {
    entries: DashMap<String, StoredIndex>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStore for MemoryIndexStore {
    fn load(&self, document_id: &str) -> Option<StoredIndex> {
        self.entries.get(document_id).map(|entry| entry.clone())
    }

    fn replace(&self, stored: &StoredIndex) -> StorageResult<()> {
        self.entries
            .insert(stored.metadata.document_id.clone(), stored.clone());
        Ok(())
    }

    fn delete(&self, document_id: &str) -> StorageResult<bool> {
        Ok(self.entries.remove(document_id).is_some())
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{DocumentIndex, ExtractedDocument};
    use crate::storage::IndexMetadata;
    use tempfile::TempDir;

    fn stored(name: &str) -> StoredIndex {
        let doc = ExtractedDocument::new(format!("{name}.pdf"), vec![], vec!["x".into()]);
        let index = DocumentIndex::empty(4);
        StoredIndex {
            metadata: IndexMetadata::new(&doc, "m", &index),
            index,
        }
    }

    fn exercise(store: &dyn IndexStore) {
        assert!(store.load("a").is_none());
        store.replace(&stored("a")).unwrap();
        store.replace(&stored("b")).unwrap();
        assert_eq!(store.load("a").unwrap().metadata.document_id, "a");
        assert_eq!(store.list().unwrap(), vec!["a", "b"]);
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert!(store.load("a").is_none());
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryIndexStore::new());
    }

    #[test]
    fn test_file_store() {
        let temp_dir = TempDir::new().unwrap();
        exercise(&FileIndexStore::new(temp_dir.path()));
    }

    #[test]
    fn test_corrupt_file_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileIndexStore::new(temp_dir.path());
        store.replace(&stored("a")).unwrap();
        std::fs::write(temp_dir.path().join("a").join("sections.json"), "{not json").unwrap();
        assert!(store.load("a").is_none());
    }
}
