//! Index command.

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use super::{embedding_generator, open_library};
use crate::config::Settings;
use crate::documents::ExtractedDocument;
use crate::library::IndexSource;

pub struct IndexOptions {
    pub force: bool,
    pub timeout: Option<u64>,
    pub threads: Option<usize>,
    pub progress: bool,
}

/// Run index command - build or reuse the index of one extracted document.
pub fn run(settings: &Settings, input: &Path, options: IndexOptions) -> anyhow::Result<()> {
    let document = ExtractedDocument::from_json_file(input)
        .with_context(|| format!("Document could not be processed: {}", input.display()))?;

    let mut settings = settings.clone();
    if let Some(secs) = options.timeout {
        settings.indexing.timeout_secs = secs.max(1);
    }
    if let Some(threads) = options.threads {
        settings.indexing.parallel_threads = threads.max(1);
    }

    let spinner = options.progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    });
    let say = |msg: String| match &spinner {
        Some(bar) => bar.set_message(msg),
        None => eprintln!("{msg}"),
    };

    say(format!("Loading embedding model {}", settings.semantic_search.model));
    let generator = embedding_generator(&settings)?;
    let library = open_library(&settings, generator)?;

    say(format!(
        "Indexing {} ({} pages)",
        document.file_path,
        document.pages_text.len()
    ));
    let result = library.get_or_build(document, options.force);

    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }

    let entry = match result {
        Ok(entry) => entry,
        Err(e) if e.is_timeout() => {
            anyhow::bail!(
                "{e}. Retry with a longer --timeout (current {}s).",
                settings.indexing.timeout_secs
            );
        }
        Err(e) => return Err(e.into()),
    };

    let meta = &entry.stored.metadata;
    match &entry.source {
        IndexSource::Cache => {
            println!(
                "Index for '{}' is up to date ({} sections, {} chunks)",
                meta.document_id, meta.section_count, meta.chunk_count
            );
        }
        IndexSource::Built(stats) => {
            println!(
                "Indexed '{}': {} pages, {} sections, {} chunks in {:.1}s",
                meta.document_id,
                stats.pages,
                meta.section_count,
                meta.chunk_count,
                stats.elapsed_ms as f64 / 1000.0
            );
            if stats.embed.failed > 0 {
                eprintln!(
                    "Warning: {} chunks could not be embedded and were excluded",
                    stats.embed.failed
                );
            }
        }
    }
    Ok(())
}
