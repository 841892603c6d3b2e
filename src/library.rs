//! Document library: cached indices keyed by document id.
//!
//! The library is the only place that decides between reusing a stored index
//! and building a fresh one. A stored index is reused only when it was built
//! from the same extraction record with the same embedding model.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::documents::{DocumentIndex, ExtractedDocument, sanitize_document_id};
use crate::indexing::{BuildStats, IndexBuilder, IndexingError};
use crate::storage::{IndexMetadata, IndexStore, StorageError, StoredIndex};
use crate::{debug_event, log_event};

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error(transparent)]
    Indexing(#[from] IndexingError),

    #[error("Failed to store index: {0}")]
    Storage(#[from] StorageError),

    #[error("No usable index for '{0}'. Index the document first.")]
    NotIndexed(String),
}

impl LibraryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Indexing(e) if e.is_timeout())
    }
}

/// Where an index handed out by `get_or_build` came from.
#[derive(Debug, Clone)]
pub enum IndexSource {
    Cache,
    Built(BuildStats),
}

#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub stored: StoredIndex,
    pub source: IndexSource,
}

pub struct DocumentLibrary {
    store: Arc<dyn IndexStore>,
    builder: Arc<IndexBuilder>,
    timeout: Duration,
}

impl DocumentLibrary {
    pub fn new(store: Arc<dyn IndexStore>, builder: Arc<IndexBuilder>, timeout: Duration) -> Self {
        Self {
            store,
            builder,
            timeout,
        }
    }

    /// Document id for a user-supplied name, file name or path.
    pub fn resolve_id(name: &str) -> String {
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.to_string());
        sanitize_document_id(&stem)
    }

    fn model(&self) -> (&str, usize) {
        let generator = self.builder.generator();
        (generator.model_name(), generator.dimension())
    }

    /// Return the cached index for `document`, building and storing it when
    /// missing, unreadable or stale. `force` always rebuilds.
    ///
    /// A failed or timed-out build leaves any stored index untouched.
    pub fn get_or_build(
        &self,
        document: ExtractedDocument,
        force: bool,
    ) -> Result<LibraryEntry, LibraryError> {
        let document_id = document.document_id();
        let source_hash = document.content_hash();
        let (model, dimension) = self.model();

        if !force {
            if let Some(stored) = self.store.load(&document_id) {
                match stored.metadata.staleness(&source_hash, model, dimension) {
                    None => {
                        debug_event!("library", "cache hit", "{document_id}");
                        return Ok(LibraryEntry {
                            stored,
                            source: IndexSource::Cache,
                        });
                    }
                    Some(reason) => debug_event!("library", "stale", "{document_id}: {reason}"),
                }
            }
        }

        let source_file = document.file_path.clone();
        let built = self.builder.build_with_deadline(document, self.timeout)?;

        let metadata = IndexMetadata::for_source(
            document_id.clone(),
            source_file,
            source_hash,
            model,
            &built.index,
        );
        let stored = StoredIndex {
            metadata,
            index: built.index,
        };
        self.store.replace(&stored)?;
        log_event!(
            "library",
            "indexed",
            "{document_id}: {} sections, {} chunks",
            stored.index.section_count(),
            stored.index.chunk_count()
        );

        Ok(LibraryEntry {
            stored,
            source: IndexSource::Built(built.stats),
        })
    }

    /// Load a stored index usable with the current embedding model.
    pub fn load(&self, document_id: &str) -> Result<StoredIndex, LibraryError> {
        let (model, dimension) = self.model();
        let stored = self
            .store
            .load(document_id)
            .ok_or_else(|| LibraryError::NotIndexed(document_id.to_string()))?;

        if stored.metadata.model != model || stored.index.dimension != dimension {
            tracing::warn!(
                target: "storage",
                "index {document_id} was built with {} ({}d), current model is {model} ({dimension}d)",
                stored.metadata.model,
                stored.index.dimension
            );
            return Err(LibraryError::NotIndexed(document_id.to_string()));
        }
        Ok(stored)
    }

    /// Every usable stored index merged into one, sections tagged by document id.
    ///
    /// Documents that cannot be loaded are skipped.
    pub fn load_all(&self) -> Result<DocumentIndex, LibraryError> {
        let mut parts = Vec::new();
        for document_id in self.store.list()? {
            match self.load(&document_id) {
                Ok(stored) => parts.push((document_id, stored.index)),
                Err(e) => debug_event!("library", "skipped", "{document_id}: {e}"),
            }
        }

        let mut merged = DocumentIndex::merge(parts);
        if merged.is_empty() {
            merged.dimension = self.builder.generator().dimension();
        }
        Ok(merged)
    }

    /// Metadata of every stored index, sorted by document id.
    pub fn list(&self) -> Result<Vec<IndexMetadata>, LibraryError> {
        Ok(self
            .store
            .list()?
            .iter()
            .filter_map(|id| self.store.load(id))
            .map(|stored| stored.metadata)
            .collect())
    }

    /// Delete a document's stored index. Returns whether one existed.
    pub fn delete(&self, document_id: &str) -> Result<bool, LibraryError> {
        let removed = self.store.delete(document_id)?;
        if removed {
            log_event!("library", "deleted", "{document_id}");
        }
        Ok(removed)
    }
}
