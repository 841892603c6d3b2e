//! Index construction: segment, embed, aggregate.
//!
//! The build is a linear, blocking pipeline per document. `build_with_deadline`
//! runs it on a dedicated worker thread so the caller can give up after a
//! timeout; the abandoned worker is told to stop at its next batch boundary
//! and its result is discarded. Nothing is written to storage here.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, bounded};

use super::IndexingError;
use super::embed::{ChunkEmbedder, EmbedStats, EmbeddingFailurePolicy};
use super::sections::{AggregationPolicy, SectionBuilder};
use crate::documents::{DocumentIndex, ExtractedDocument, Segmenter};
use crate::semantic::EmbeddingGenerator;

/// Knobs for one index build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub failure_policy: EmbeddingFailurePolicy,
    pub aggregation: AggregationPolicy,
    /// Worker threads for parallel embedding.
    pub threads: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            failure_policy: EmbeddingFailurePolicy::default(),
            aggregation: AggregationPolicy::default(),
            threads: num_cpus::get(),
        }
    }
}

/// Statistics from one build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStats {
    pub pages: usize,
    pub chunks_segmented: usize,
    pub sections: usize,
    pub embed: EmbedStats,
    pub elapsed_ms: u128,
}

/// A freshly built index with its statistics.
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub index: DocumentIndex,
    pub stats: BuildStats,
}

/// Builds a `DocumentIndex` from an extraction record.
pub struct IndexBuilder {
    segmenter: Segmenter,
    generator: Arc<dyn EmbeddingGenerator>,
    options: BuildOptions,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("segmenter", &self.segmenter)
            .field("model", &self.generator.model_name())
            .field("options", &self.options)
            .finish()
    }
}

impl IndexBuilder {
    pub fn new(
        segmenter: Segmenter,
        generator: Arc<dyn EmbeddingGenerator>,
        options: BuildOptions,
    ) -> Result<Self, IndexingError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads.max(1))
            .thread_name(|i| format!("querydoc-embed-{i}"))
            .build()
            .map_err(|e| IndexingError::ThreadPool(e.to_string()))?;

        Ok(Self {
            segmenter,
            generator,
            options,
            pool,
        })
    }

    pub fn generator(&self) -> &Arc<dyn EmbeddingGenerator> {
        &self.generator
    }

    /// Build on the calling thread.
    pub fn build(&self, document: &ExtractedDocument) -> Result<BuiltIndex, IndexingError> {
        self.build_cancellable(document, &AtomicBool::new(false))
    }

    /// Build on a worker thread, giving up after `timeout`.
    ///
    /// On timeout returns `IndexingError::Timeout`; the worker is signalled to
    /// stop and anything it produces afterwards is dropped.
    pub fn build_with_deadline(
        self: &Arc<Self>,
        document: ExtractedDocument,
        timeout: Duration,
    ) -> Result<BuiltIndex, IndexingError> {
        let (sender, receiver) = bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let document_id = document.document_id();

        let worker = Arc::clone(self);
        let flag = Arc::clone(&cancelled);
        std::thread::Builder::new()
            .name(format!("querydoc-index-{document_id}"))
            .spawn(move || {
                let result = worker.build_cancellable(&document, &flag);
                // Receiver is gone after a timeout.
                let _ = sender.send(result);
            })
            .map_err(|e| IndexingError::ThreadPool(e.to_string()))?;

        match receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                cancelled.store(true, Ordering::Relaxed);
                tracing::warn!(
                    target: "pipeline",
                    "indexing {document_id} exceeded {}s, abandoning",
                    timeout.as_secs()
                );
                Err(IndexingError::Timeout {
                    document: document_id,
                    secs: timeout.as_secs(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(IndexingError::WorkerPanicked(document_id)),
        }
    }

    fn build_cancellable(
        &self,
        document: &ExtractedDocument,
        cancelled: &AtomicBool,
    ) -> Result<BuiltIndex, IndexingError> {
        let started = Instant::now();

        if document.pages_text.is_empty() {
            return Err(IndexingError::Extraction(format!(
                "{}: no pages extracted",
                document.file_path
            )));
        }

        let segmented = self.segmenter.segment(document)?;
        let chunks_segmented = segmented.chunks.len();

        let embedder = ChunkEmbedder::new(self.generator.as_ref(), self.options.failure_policy)
            .with_cancellation(cancelled);
        let (embedded, embed_stats) = self
            .pool
            .install(|| embedder.embed_chunks(&segmented.file_id, segmented.chunks))?;

        if cancelled.load(Ordering::Relaxed) {
            return Err(IndexingError::Cancelled(document.file_path.clone()));
        }

        // Aggregation starts only after every chunk has been embedded.
        let dimension = self.generator.dimension();
        let (sections, chunks) = SectionBuilder::new(self.options.aggregation).build(
            &segmented.section_titles,
            embedded,
            dimension,
        );

        let stats = BuildStats {
            pages: document.pages_text.len(),
            chunks_segmented,
            sections: sections.len(),
            embed: embed_stats,
            elapsed_ms: started.elapsed().as_millis(),
        };

        tracing::info!(
            target: "pipeline",
            "indexed {}: {} pages, {} chunks ({} failed), {} sections in {}ms",
            document.file_path,
            stats.pages,
            stats.embed.chunks_embedded,
            stats.embed.failed,
            stats.sections,
            stats.elapsed_ms
        );

        Ok(BuiltIndex {
            index: DocumentIndex {
                dimension,
                sections,
                chunks,
            },
            stats,
        })
    }
}
