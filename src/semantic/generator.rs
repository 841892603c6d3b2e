//! fastembed-backed embedding generator with a pool of model instances.
//!
//! Each `TextEmbedding` instance is expensive (~86MB for AllMiniLML6V2),
//! but several of them allow true parallel embedding with rayon.

use crossbeam_channel::{Receiver, Sender, bounded};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{EmbeddingGenerator, SemanticSearchError};

/// Texts per model call.
const BATCH_SIZE: usize = 64;

/// Map a configured model name to a fastembed model.
pub fn parse_model(name: &str) -> Result<EmbeddingModel, SemanticSearchError> {
    let model = match name {
        "AllMiniLML6V2" => EmbeddingModel::AllMiniLML6V2,
        "AllMiniLML12V2" => EmbeddingModel::AllMiniLML12V2,
        "BGESmallENV15" => EmbeddingModel::BGESmallENV15,
        "BGEBaseENV15" => EmbeddingModel::BGEBaseENV15,
        "BGELargeENV15" => EmbeddingModel::BGELargeENV15,
        "MultilingualE5Small" => EmbeddingModel::MultilingualE5Small,
        "MultilingualE5Base" => EmbeddingModel::MultilingualE5Base,
        "ParaphraseMLMiniLML12V2" => EmbeddingModel::ParaphraseMLMiniLML12V2,
        other => return Err(SemanticSearchError::UnknownModel(other.to_string())),
    };
    Ok(model)
}

/// Model instance with an ID for tracking
struct ModelInstance {
    model: TextEmbedding,
    id: usize,
}

/// Pool of fastembed models implementing `EmbeddingGenerator`.
pub struct FastEmbedGenerator {
    /// Channel to acquire models from the pool
    model_sender: Sender<ModelInstance>,
    model_receiver: Receiver<ModelInstance>,
    dimensions: usize,
    model_name: String,
    /// Usage counters per model instance (for tracing)
    usage_counters: Vec<AtomicUsize>,
}

impl FastEmbedGenerator {
    /// Create a pool of `pool_size` instances of the named model.
    ///
    /// Models are cached under `cache_dir`.
    pub fn new(
        model_name: &str,
        pool_size: usize,
        cache_dir: PathBuf,
    ) -> Result<Self, SemanticSearchError> {
        let model = parse_model(model_name)?;
        let pool_size = pool_size.max(1);
        let (sender, receiver) = bounded(pool_size);

        tracing::info!(
            target: "embed",
            "Initializing embedding pool: {pool_size} instances ({model_name})"
        );

        let mut dimensions = 0;
        for i in 0..pool_size {
            let mut text_model = TextEmbedding::try_new(
                InitOptions::new(model.clone())
                    .with_cache_dir(cache_dir.clone())
                    .with_show_download_progress(i == 0),
            )
            .map_err(|e| {
                SemanticSearchError::ModelInitError(format!(
                    "Failed to initialize model instance {}: {e}",
                    i + 1
                ))
            })?;

            if i == 0 {
                let sample = text_model
                    .embed(vec!["test"], None)
                    .map_err(|e| SemanticSearchError::EmbeddingError(e.to_string()))?;
                dimensions = sample.first().map(Vec::len).ok_or_else(|| {
                    SemanticSearchError::ModelInitError("model returned no embedding".to_string())
                })?;
            }

            sender
                .send(ModelInstance {
                    model: text_model,
                    id: i,
                })
                .map_err(|_| {
                    SemanticSearchError::ModelInitError("embedding pool closed".to_string())
                })?;
        }

        tracing::info!(
            target: "embed",
            "Embedding pool ready: {pool_size} instances, {dimensions} dimensions"
        );

        Ok(Self {
            model_sender: sender,
            model_receiver: receiver,
            dimensions,
            model_name: model_name.to_string(),
            usage_counters: (0..pool_size).map(|_| AtomicUsize::new(0)).collect(),
        })
    }

    /// Default model cache directory.
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("querydoc")
            .join("models")
    }

    /// Run `f` with a model from the pool (blocks if none available).
    fn with_model<T>(
        &self,
        f: impl FnOnce(&mut TextEmbedding) -> T,
    ) -> Result<T, SemanticSearchError> {
        let mut instance = self
            .model_receiver
            .recv()
            .map_err(|_| SemanticSearchError::EmbeddingError("embedding pool closed".into()))?;
        self.usage_counters[instance.id].fetch_add(1, Ordering::Relaxed);

        let result = f(&mut instance.model);
        let _ = self.model_sender.send(instance);
        Ok(result)
    }

    fn check_dimension(&self, embedding: Vec<f32>) -> Result<Vec<f32>, SemanticSearchError> {
        if embedding.len() == self.dimensions {
            Ok(embedding)
        } else {
            Err(SemanticSearchError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            })
        }
    }

    /// Log usage statistics for all model instances.
    pub fn log_usage_stats(&self) {
        let counts: Vec<usize> = self
            .usage_counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect();
        let total: usize = counts.iter().sum();

        if total > 0 {
            let usage: Vec<String> = counts
                .iter()
                .enumerate()
                .map(|(i, c)| format!("model[{i}]={c}"))
                .collect();
            tracing::debug!(
                target: "embed",
                "Embedding pool usage: {} (total: {total})",
                usage.join(", ")
            );
        }
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticSearchError> {
        if text.trim().is_empty() {
            return Err(SemanticSearchError::EmbeddingError("Empty text".to_string()));
        }

        let embeddings = self
            .with_model(|model| model.embed(vec![text], None))?
            .map_err(|e| SemanticSearchError::EmbeddingError(e.to_string()))?;

        let embedding = embeddings.into_iter().next().ok_or_else(|| {
            SemanticSearchError::EmbeddingError("model returned no embedding".to_string())
        })?;
        self.check_dimension(embedding)
    }

    /// Batches are spread across pool instances. A failed batch is retried
    /// item by item so one bad text does not fail its neighbours.
    fn embed_batch(&self, texts: &[&str]) -> Vec<Result<Vec<f32>, SemanticSearchError>> {
        let results: Vec<Result<Vec<f32>, SemanticSearchError>> = texts
            .par_chunks(BATCH_SIZE)
            .flat_map_iter(|batch| {
                let batch_result = self.with_model(|model| model.embed(batch.to_vec(), None));

                match batch_result {
                    Ok(Ok(embeddings)) if embeddings.len() == batch.len() => embeddings
                        .into_iter()
                        .map(|e| self.check_dimension(e))
                        .collect::<Vec<_>>(),
                    _ => {
                        tracing::warn!(
                            target: "embed",
                            "Batch embedding failed, retrying {} texts individually",
                            batch.len()
                        );
                        batch.iter().map(|text| self.embed(text)).collect()
                    }
                }
            })
            .collect();

        self.log_usage_stats();
        results
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
