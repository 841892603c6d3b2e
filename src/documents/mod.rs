//! Document model and segmentation.
//!
//! This module provides:
//! - The extraction input record and table-of-contents entries
//! - Chunk, section and index types
//! - Table-of-contents page resolution
//! - The segmenter that turns page text into numbered, section-tagged chunks

pub mod config;
pub mod segmenter;
pub mod toc;
pub mod types;

pub use config::{ChunkingConfig, TocPolicy};
pub use segmenter::{Chunker, FixedWindowChunker, Segmenter, clean_text};
pub use toc::TableOfContents;
pub use types::{
    ChunkId, DocumentChunk, DocumentIndex, ExtractedDocument, RawChunk, Section,
    SegmentedDocument, TocEntry, UNCATEGORIZED_SECTION, sanitize_document_id,
};

use thiserror::Error;

/// Errors from reading or segmenting an extracted document.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse extraction record: {0}")]
    Parse(String),

    #[error("Table of contents is not sorted by start page: '{title}' starts at page {start_page} after page {previous}")]
    UnsortedToc {
        title: String,
        start_page: u32,
        previous: u32,
    },

    #[error("Invalid chunking configuration: {0}")]
    InvalidConfig(String),
}
