//! Index construction: chunk embedding, section aggregation and the build pipeline.

pub mod builder;
pub mod embed;
pub mod sections;

pub use builder::{BuildOptions, BuildStats, BuiltIndex, IndexBuilder};
pub use embed::{ChunkEmbedder, EmbedStats, EmbeddedChunk, EmbeddingFailurePolicy};
pub use sections::{AggregationPolicy, SectionBuilder};

use thiserror::Error;

use crate::documents::DocumentError;
use crate::semantic::SemanticSearchError;

/// Errors from building a document index.
#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Document could not be processed: {0}")]
    Extraction(String),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Indexing {document} timed out after {secs}s")]
    Timeout { document: String, secs: u64 },

    #[error("Indexing {0} was cancelled")]
    Cancelled(String),

    #[error("Embedding failed for page {page_index} chunk {chunk_index}: {source}")]
    Embedding {
        page_index: u32,
        chunk_index: u32,
        #[source]
        source: SemanticSearchError,
    },

    #[error("Indexing worker for {0} stopped without a result")]
    WorkerPanicked(String),

    #[error("Failed to start indexing workers: {0}")]
    ThreadPool(String),

    #[error("Internal indexing error: {0}")]
    Internal(String),
}

impl IndexingError {
    /// Whether retrying with a longer deadline could succeed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type IndexingResult<T> = Result<T, IndexingError>;
