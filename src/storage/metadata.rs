//! Metadata tracking for index provenance and staleness checks

use serde::{Deserialize, Serialize};

use crate::documents::{DocumentIndex, ExtractedDocument};

/// Version of the on-disk index format.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// What an index was built from and with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Version of the index format
    pub version: u32,

    /// Cache key of the document
    pub document_id: String,

    /// Source file identifier from the extraction record
    pub source_file: String,

    /// SHA-256 of the extraction record
    pub source_hash: String,

    /// Embedding model the vectors came from
    pub model: String,

    pub dimension: usize,

    pub chunk_count: usize,

    pub section_count: usize,

    /// Seconds since UNIX_EPOCH when the index was built
    pub built_at: u64,
}

impl IndexMetadata {
    /// Describe a freshly built index.
    pub fn new(document: &ExtractedDocument, model: &str, index: &DocumentIndex) -> Self {
        Self::for_source(
            document.document_id(),
            document.file_path.clone(),
            document.content_hash(),
            model,
            index,
        )
    }

    /// Describe an index whose source document is no longer at hand.
    pub fn for_source(
        document_id: String,
        source_file: String,
        source_hash: String,
        model: &str,
        index: &DocumentIndex,
    ) -> Self {
        Self {
            version: INDEX_FORMAT_VERSION,
            document_id,
            source_file,
            source_hash,
            model: model.to_string(),
            dimension: index.dimension,
            chunk_count: index.chunk_count(),
            section_count: index.section_count(),
            built_at: get_utc_timestamp(),
        }
    }

    /// Why this index cannot serve a request, if it cannot.
    ///
    /// A changed source, a different embedding model, or a different vector
    /// dimension all make the cached index stale.
    pub fn staleness(&self, source_hash: &str, model: &str, dimension: usize) -> Option<String> {
        if self.version != INDEX_FORMAT_VERSION {
            return Some(format!(
                "format version {} (current {INDEX_FORMAT_VERSION})",
                self.version
            ));
        }
        if self.source_hash != source_hash {
            return Some("source document changed".to_string());
        }
        if self.model != model {
            return Some(format!("built with model {} (current {model})", self.model));
        }
        if self.dimension != dimension {
            return Some(format!(
                "dimension {} (current {dimension})",
                self.dimension
            ));
        }
        None
    }
}

/// Current time as seconds since UNIX_EPOCH.
pub fn get_utc_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> IndexMetadata {
        let doc = ExtractedDocument::new("report.pdf", vec![], vec!["text".into()]);
        IndexMetadata::new(&doc, "AllMiniLML6V2", &DocumentIndex::empty(384))
    }

    #[test]
    fn test_fresh_metadata_is_not_stale() {
        let meta = metadata();
        assert_eq!(meta.document_id, "report");
        let hash = meta.source_hash.clone();
        assert!(meta.staleness(&hash, "AllMiniLML6V2", 384).is_none());
    }

    #[test]
    fn test_staleness_reasons() {
        let meta = metadata();
        let hash = meta.source_hash.clone();
        assert!(meta.staleness("other", "AllMiniLML6V2", 384).is_some());
        assert!(meta.staleness(&hash, "BGESmallENV15", 384).is_some());
        assert!(meta.staleness(&hash, "AllMiniLML6V2", 768).is_some());
    }
}
