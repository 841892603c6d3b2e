//! Core types for extracted documents, chunks, sections and the searchable index.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroU32;
use std::path::Path;

use super::DocumentError;

/// Section title given to pages that precede the first table-of-contents entry.
pub const UNCATEGORIZED_SECTION: &str = "Uncategorized";

/// Unique identifier for a chunk within one index (dense, 1-based ordinal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(NonZeroU32);

impl ChunkId {
    /// Create a ChunkId from a u32, returning None if zero.
    pub fn from_u32(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    /// Get the inner value as u32.
    pub fn value(&self) -> u32 {
        self.0.get()
    }

    /// Position of this chunk in the flat chunk list.
    pub fn ordinal(&self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// Convert to bytes for storage (little-endian).
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.get().to_le_bytes()
    }

    /// Create from bytes (little-endian).
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::from_u32(u32::from_le_bytes(bytes))
    }
}

/// One table-of-contents entry: `(level, title, start_page)`.
///
/// `start_page` is 1-based. Accepts both the array form `[1, "Intro", 1]`
/// and the object form when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTocEntry")]
pub struct TocEntry {
    pub level: u32,
    pub title: String,
    pub start_page: u32,
}

impl TocEntry {
    pub fn new(level: u32, title: impl Into<String>, start_page: u32) -> Self {
        Self {
            level,
            title: title.into(),
            start_page,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTocEntry {
    Tuple(u32, String, u32),
    Object {
        #[serde(default)]
        level: u32,
        title: String,
        start_page: u32,
    },
}

impl From<RawTocEntry> for TocEntry {
    fn from(raw: RawTocEntry) -> Self {
        match raw {
            RawTocEntry::Tuple(level, title, start_page) => Self::new(level, title, start_page),
            RawTocEntry::Object {
                level,
                title,
                start_page,
            } => Self::new(level, title, start_page),
        }
    }
}

/// Output of the document-extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Source file identifier (usually the original path).
    pub file_path: String,

    /// Table of contents in document order.
    #[serde(default)]
    pub toc: Vec<TocEntry>,

    /// Plain text per page, addressed 0-based.
    #[serde(alias = "pages")]
    pub pages_text: Vec<String>,
}

impl ExtractedDocument {
    pub fn new(file_path: impl Into<String>, toc: Vec<TocEntry>, pages_text: Vec<String>) -> Self {
        Self {
            file_path: file_path.into(),
            toc,
            pages_text,
        }
    }

    /// Load an extraction record from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| DocumentError::Parse(format!("{}: {e}", path.display())))
    }

    /// Cache key for this document: the sanitized file stem.
    pub fn document_id(&self) -> String {
        let stem = Path::new(&self.file_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        sanitize_document_id(&stem)
    }

    /// SHA-256 of the extraction record, used to detect source changes.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.file_path.as_bytes());
        for entry in &self.toc {
            hasher.update(entry.level.to_le_bytes());
            hasher.update(entry.start_page.to_le_bytes());
            hasher.update((entry.title.len() as u64).to_le_bytes());
            hasher.update(entry.title.as_bytes());
        }
        for page in &self.pages_text {
            hasher.update((page.len() as u64).to_le_bytes());
            hasher.update(page.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Make a name safe to use as a single path component.
pub fn sanitize_document_id(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

/// A chunk as produced by the segmenter, before embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    /// 0-based page index.
    pub page_index: u32,

    /// 0-based, gap-free position within the page.
    pub chunk_index: u32,

    /// Ordinal of the section this chunk belongs to (see `SegmentedDocument::section_titles`).
    pub section_index: usize,

    /// Title of that section.
    pub section_title: String,

    /// Trimmed text content.
    pub content: String,
}

impl RawChunk {
    /// Get character count.
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// Result of segmenting one document.
#[derive(Debug, Clone, Default)]
pub struct SegmentedDocument {
    /// Source file identifier.
    pub file_id: String,

    /// Section titles by ordinal, in document order.
    pub section_titles: Vec<String>,

    /// Chunks in (page, chunk) order.
    pub chunks: Vec<RawChunk>,
}

/// An embedded chunk, the unit of fine-grained retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,

    /// Source file identifier.
    pub file_id: String,

    pub page_index: u32,

    /// Denormalized from the owning section.
    pub section_title: String,

    pub chunk_index: u32,

    pub content: String,

    pub embedding: Vec<f32>,
}

impl DocumentChunk {
    /// Citation key: `(page_index, chunk_index)`.
    pub fn key(&self) -> (u32, u32) {
        (self.page_index, self.chunk_index)
    }

    /// Get the length of the content in characters.
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// A structurally named page range, the unit of coarse-grained retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Title from the table of contents (not guaranteed unique).
    pub title: String,

    /// Name of the source document, set when several indices are merged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,

    /// Member chunks in (page, chunk) order.
    pub chunk_ids: Vec<ChunkId>,

    /// Aggregate of the member chunk embeddings. Derived; never edited directly.
    pub representative: Vec<f32>,
}

impl Section {
    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }
}

/// All sections and chunks for one document, or several merged documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentIndex {
    pub dimension: usize,
    pub sections: Vec<Section>,
    pub chunks: Vec<DocumentChunk>,
}

impl DocumentIndex {
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            sections: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Look up a chunk by its flat ordinal id.
    pub fn chunk(&self, id: ChunkId) -> Option<&DocumentChunk> {
        self.chunks.get(id.ordinal()).filter(|c| c.id == id)
    }

    /// Member chunks of a section, in stored order.
    pub fn section_chunks<'a>(
        &'a self,
        section: &'a Section,
    ) -> impl Iterator<Item = &'a DocumentChunk> + 'a {
        section.chunk_ids.iter().filter_map(|id| self.chunk(*id))
    }

    /// Find a chunk by its citation key within a section.
    pub fn find_in_section<'a>(
        &'a self,
        section: &'a Section,
        page_index: u32,
        chunk_index: u32,
    ) -> Option<&'a DocumentChunk> {
        self.section_chunks(section)
            .find(|c| c.key() == (page_index, chunk_index))
    }

    /// Concatenate several documents' indices, tagging each section with its document name.
    ///
    /// Chunk ids are offset so they stay dense; nothing is re-embedded or re-aggregated.
    /// Parts whose dimension disagrees with the first non-empty part are skipped.
    pub fn merge(parts: impl IntoIterator<Item = (String, DocumentIndex)>) -> DocumentIndex {
        let mut merged = DocumentIndex::default();

        for (name, part) in parts {
            if !part.is_empty() {
                if merged.chunks.is_empty() {
                    merged.dimension = part.dimension;
                } else if part.dimension != merged.dimension {
                    tracing::warn!(
                        target: "storage",
                        "skipping '{name}' in merge: dimension {} != {}",
                        part.dimension,
                        merged.dimension
                    );
                    continue;
                }
            }

            let offset = merged.chunks.len() as u32;
            let shift = |id: ChunkId| ChunkId::from_u32(id.value() + offset).unwrap_or(id);

            merged.chunks.extend(part.chunks.into_iter().map(|mut chunk| {
                chunk.id = shift(chunk.id);
                chunk
            }));
            merged
                .sections
                .extend(part.sections.into_iter().map(|mut section| {
                    section.chunk_ids = section.chunk_ids.into_iter().map(shift).collect();
                    section.document = Some(name.clone());
                    section
                }));
        }

        merged
    }
}
