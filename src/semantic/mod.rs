//! Embedding capability and vector similarity.
//!
//! The core depends only on the `EmbeddingGenerator` trait; the fastembed
//! backed `FastEmbedGenerator` is one implementation of it.

mod generator;

pub use generator::{FastEmbedGenerator, parse_model};

// Re-export key types
pub use fastembed::EmbeddingModel;

use thiserror::Error;

/// Error type for embedding operations
#[derive(Debug, Error)]
pub enum SemanticSearchError {
    #[error("Failed to initialize embedding model: {0}")]
    ModelInitError(String),

    #[error("Failed to generate embedding: {0}")]
    EmbeddingError(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unknown embedding model: {0}")]
    UnknownModel(String),
}

/// Text to fixed-length vector capability.
///
/// All vectors produced by one generator share the same dimension. Indices
/// built with one model must not be queried with another.
pub trait EmbeddingGenerator: Send + Sync {
    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticSearchError>;

    /// Embed several texts. One result per input, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Vec<Result<Vec<f32>, SemanticSearchError>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Vector dimension.
    fn dimension(&self) -> usize;

    /// Model name recorded in index metadata.
    fn model_name(&self) -> &str;
}

impl<T: EmbeddingGenerator + ?Sized> EmbeddingGenerator for std::sync::Arc<T> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticSearchError> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Vec<Result<Vec<f32>, SemanticSearchError>> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Calculate cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
