//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod index;
pub mod init;
pub mod library;
pub mod query;
pub mod serve;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::documents::Segmenter;
use crate::indexing::{BuildOptions, IndexBuilder};
use crate::library::DocumentLibrary;
use crate::semantic::{EmbeddingGenerator, FastEmbedGenerator};
use crate::storage::FileIndexStore;

/// Load the configured embedding model.
pub fn embedding_generator(settings: &Settings) -> anyhow::Result<Arc<dyn EmbeddingGenerator>> {
    let semantic = &settings.semantic_search;
    let cache_dir = semantic
        .cache_dir
        .clone()
        .unwrap_or_else(FastEmbedGenerator::default_cache_dir);

    let generator = FastEmbedGenerator::new(&semantic.model, semantic.pool_size, cache_dir)
        .with_context(|| format!("Failed to load embedding model {}", semantic.model))?;
    Ok(Arc::new(generator))
}

/// Library over the configured index directory and embedding model.
pub fn open_library(
    settings: &Settings,
    generator: Arc<dyn EmbeddingGenerator>,
) -> anyhow::Result<DocumentLibrary> {
    let segmenter = Segmenter::new(settings.chunking.clone())?;
    let options = BuildOptions {
        failure_policy: settings.indexing.embedding_failure,
        aggregation: settings.semantic_search.aggregation,
        threads: settings.indexing.parallel_threads,
    };
    let builder = IndexBuilder::new(segmenter, generator, options)?;
    let store = FileIndexStore::new(settings.index_path.clone());

    Ok(DocumentLibrary::new(
        Arc::new(store),
        Arc::new(builder),
        Duration::from_secs(settings.indexing.timeout_secs),
    ))
}
