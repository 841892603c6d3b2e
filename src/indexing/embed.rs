//! Chunk representation: one embedding vector per chunk.
//!
//! Data flow:
//! - Receives: Vec<RawChunk> from the segmenter
//! - Uses: EmbeddingGenerator::embed_batch()
//! - Produces: Vec<EmbeddedChunk> with dense ChunkIds assigned after failures are removed

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

use super::IndexingError;
use crate::documents::{ChunkId, DocumentChunk, RawChunk};
use crate::semantic::EmbeddingGenerator;

/// Chunks per embed_batch call. Cancellation is checked between batches.
const EMBED_BATCH_SIZE: usize = 256;

/// What to do when a single chunk fails to embed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingFailurePolicy {
    /// Exclude the chunk from the index and continue.
    #[default]
    Skip,
    /// Fail the whole document.
    Abort,
}

/// A chunk with its embedding and the section it belongs to.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub section_index: usize,
    pub chunk: DocumentChunk,
}

/// Result of embedding a document's chunks.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedStats {
    /// Number of chunks embedded
    pub chunks_embedded: usize,
    /// Number of batches processed
    pub batches_processed: usize,
    /// Number of chunks excluded because embedding failed
    pub failed: usize,
}

/// Embeds segmented chunks.
pub struct ChunkEmbedder<'a> {
    generator: &'a dyn EmbeddingGenerator,
    policy: EmbeddingFailurePolicy,
    cancelled: Option<&'a AtomicBool>,
}

impl<'a> ChunkEmbedder<'a> {
    pub fn new(generator: &'a dyn EmbeddingGenerator, policy: EmbeddingFailurePolicy) -> Self {
        Self {
            generator,
            policy,
            cancelled: None,
        }
    }

    /// Stop between batches once `flag` is set.
    pub fn with_cancellation(mut self, flag: &'a AtomicBool) -> Self {
        self.cancelled = Some(flag);
        self
    }

    /// Embed every chunk of one document.
    ///
    /// Chunks whose embedding fails (or has the wrong dimension) are dropped
    /// under `Skip` and counted in `failed`; under `Abort` the first failure
    /// is returned as an error.
    pub fn embed_chunks(
        &self,
        file_id: &str,
        chunks: Vec<RawChunk>,
    ) -> Result<(Vec<EmbeddedChunk>, EmbedStats), IndexingError> {
        let mut stats = EmbedStats::default();
        let mut embedded = Vec::with_capacity(chunks.len());
        let dimension = self.generator.dimension();

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            if self.cancelled.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(IndexingError::Cancelled(file_id.to_string()));
            }

            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let results = self.generator.embed_batch(&texts);

            for (raw, result) in batch.iter().zip(results) {
                let result = result.and_then(|vector| {
                    if vector.len() == dimension {
                        Ok(vector)
                    } else {
                        Err(crate::semantic::SemanticSearchError::DimensionMismatch {
                            expected: dimension,
                            actual: vector.len(),
                        })
                    }
                });

                match result {
                    Ok(embedding) => {
                        // Ids are assigned post-filtering so they stay dense.
                        let id = ChunkId::from_u32(embedded.len() as u32 + 1)
                            .ok_or_else(|| IndexingError::Internal("chunk id overflow".into()))?;
                        embedded.push(EmbeddedChunk {
                            section_index: raw.section_index,
                            chunk: DocumentChunk {
                                id,
                                file_id: file_id.to_string(),
                                page_index: raw.page_index,
                                section_title: raw.section_title.clone(),
                                chunk_index: raw.chunk_index,
                                content: raw.content.clone(),
                                embedding,
                            },
                        });
                    }
                    Err(e) => match self.policy {
                        EmbeddingFailurePolicy::Skip => {
                            tracing::warn!(
                                target: "embed",
                                "excluding chunk page={} index={} of {file_id}: {e}",
                                raw.page_index,
                                raw.chunk_index
                            );
                            stats.failed += 1;
                        }
                        EmbeddingFailurePolicy::Abort => {
                            return Err(IndexingError::Embedding {
                                page_index: raw.page_index,
                                chunk_index: raw.chunk_index,
                                source: e,
                            });
                        }
                    },
                }
            }

            stats.batches_processed += 1;
        }

        stats.chunks_embedded = embedded.len();
        tracing::debug!(
            target: "embed",
            "{file_id}: embedded {} chunks in {} batches ({} failed)",
            stats.chunks_embedded,
            stats.batches_processed,
            stats.failed
        );

        Ok((embedded, stats))
    }
}
