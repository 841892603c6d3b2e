//! Index builds through the document library: failure policies, deadlines and caching.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FailingEmbedder, LetterEmbedder, SlowEmbedder};
use querydoc::documents::{ChunkingConfig, ExtractedDocument, Segmenter, TocEntry};
use querydoc::indexing::{BuildOptions, EmbeddingFailurePolicy, IndexBuilder, IndexingError};
use querydoc::library::{DocumentLibrary, IndexSource, LibraryError};
use querydoc::semantic::EmbeddingGenerator;
use querydoc::storage::{IndexStore, MemoryIndexStore};

fn builder(
    generator: Arc<dyn EmbeddingGenerator>,
    policy: EmbeddingFailurePolicy,
) -> Arc<IndexBuilder> {
    Arc::new(
        IndexBuilder::new(
            Segmenter::new(ChunkingConfig::with_max_chars(50)).unwrap(),
            generator,
            BuildOptions {
                failure_policy: policy,
                threads: 2,
                ..Default::default()
            },
        )
        .unwrap(),
    )
}

fn library(
    store: Arc<dyn IndexStore>,
    generator: Arc<dyn EmbeddingGenerator>,
    policy: EmbeddingFailurePolicy,
) -> DocumentLibrary {
    DocumentLibrary::new(store, builder(generator, policy), Duration::from_secs(30))
}

fn document_with_bad_page() -> ExtractedDocument {
    ExtractedDocument::new(
        "notes.pdf",
        vec![TocEntry::new(1, "Only", 1)],
        vec!["good text".into(), "poison text".into(), "more text".into()],
    )
}

#[test]
fn test_skip_policy_drops_failed_chunks() {
    let builder = builder(
        Arc::new(FailingEmbedder { marker: "poison" }),
        EmbeddingFailurePolicy::Skip,
    );
    let built = builder.build(&document_with_bad_page()).unwrap();

    assert_eq!(built.stats.embed.failed, 1);
    assert_eq!(built.index.chunk_count(), 2);
    let ids: Vec<u32> = built.index.chunks.iter().map(|c| c.id.value()).collect();
    assert_eq!(ids, vec![1, 2]);
    let pages: Vec<u32> = built.index.chunks.iter().map(|c| c.page_index).collect();
    assert_eq!(pages, vec![0, 2]);
    assert_eq!(built.index.sections[0].chunk_ids.len(), 2);
}

#[test]
fn test_abort_policy_fails_the_document() {
    let builder = builder(
        Arc::new(FailingEmbedder { marker: "poison" }),
        EmbeddingFailurePolicy::Abort,
    );

    match builder.build(&document_with_bad_page()) {
        Err(IndexingError::Embedding { page_index, .. }) => assert_eq!(page_index, 1),
        other => panic!("expected embedding failure, got {other:?}"),
    }
}

#[test]
fn test_document_without_pages_is_rejected() {
    let builder = builder(Arc::new(LetterEmbedder::new()), EmbeddingFailurePolicy::Skip);
    let empty = ExtractedDocument::new("blank.pdf", vec![], vec![]);
    assert!(matches!(
        builder.build(&empty),
        Err(IndexingError::Extraction(_))
    ));
}

#[test]
fn test_slow_build_times_out_and_stores_nothing() {
    let store = Arc::new(MemoryIndexStore::new());
    let slow = DocumentLibrary::new(
        store.clone(),
        builder(
            Arc::new(SlowEmbedder {
                delay: Duration::from_millis(200),
            }),
            EmbeddingFailurePolicy::Skip,
        ),
        Duration::from_millis(50),
    );

    let err = slow
        .get_or_build(common::survey_document(), false)
        .expect_err("build should exceed its deadline");
    assert!(err.is_timeout());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_second_request_is_served_from_cache() {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
    let letters = Arc::new(LetterEmbedder::new());
    let library = library(store, letters.clone(), EmbeddingFailurePolicy::Skip);

    let first = library.get_or_build(common::survey_document(), false).unwrap();
    assert!(matches!(first.source, IndexSource::Built(_)));
    let calls_after_build = letters.calls();
    assert!(calls_after_build > 0);

    let second = library.get_or_build(common::survey_document(), false).unwrap();
    assert!(matches!(second.source, IndexSource::Cache));
    assert_eq!(letters.calls(), calls_after_build);
    assert_eq!(second.stored.index, first.stored.index);

    let forced = library.get_or_build(common::survey_document(), true).unwrap();
    assert!(matches!(forced.source, IndexSource::Built(_)));
}

#[test]
fn test_changed_source_rebuilds() {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
    let library = library(store, Arc::new(LetterEmbedder::new()), EmbeddingFailurePolicy::Skip);

    let original = common::intro_methods_document();
    library.get_or_build(original.clone(), false).unwrap();

    let mut edited = original;
    edited.pages_text[1] = "z".repeat(120);
    let rebuilt = library.get_or_build(edited.clone(), false).unwrap();

    assert!(matches!(rebuilt.source, IndexSource::Built(_)));
    assert_eq!(rebuilt.stored.metadata.source_hash, edited.content_hash());
    assert_eq!(library.load("study").unwrap().metadata.source_hash, edited.content_hash());
}

#[test]
fn test_failed_rebuild_keeps_previous_index() {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
    let good = library(
        store.clone(),
        Arc::new(LetterEmbedder::new()),
        EmbeddingFailurePolicy::Skip,
    );
    let document = document_with_bad_page();
    let previous = good.get_or_build(document.clone(), false).unwrap().stored;

    let failing = library(
        store.clone(),
        Arc::new(FailingEmbedder { marker: "poison" }),
        EmbeddingFailurePolicy::Abort,
    );
    let err = failing.get_or_build(document, true).unwrap_err();
    assert!(matches!(err, LibraryError::Indexing(IndexingError::Embedding { .. })));

    assert_eq!(store.load("notes"), Some(previous));
}

#[test]
fn test_load_all_tags_each_document() {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
    let library = library(store, Arc::new(LetterEmbedder::new()), EmbeddingFailurePolicy::Skip);
    library.get_or_build(common::intro_methods_document(), false).unwrap();
    library.get_or_build(common::survey_document(), false).unwrap();

    let merged = library.load_all().unwrap();
    let documents: Vec<Option<&str>> = merged
        .sections
        .iter()
        .map(|s| s.document.as_deref())
        .collect();
    assert!(documents.iter().all(Option::is_some));
    assert!(documents.contains(&Some("study")));
    assert!(documents.contains(&Some("survey")));

    let listed: Vec<String> = library
        .list()
        .unwrap()
        .into_iter()
        .map(|m| m.document_id)
        .collect();
    assert_eq!(listed, vec!["study".to_string(), "survey".to_string()]);

    assert!(library.delete("study").unwrap());
    assert!(matches!(library.load("study"), Err(LibraryError::NotIndexed(_))));
}

#[test]
fn test_load_all_on_empty_library_is_empty() {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
    let library = library(store, Arc::new(LetterEmbedder::new()), EmbeddingFailurePolicy::Skip);

    let merged = library.load_all().unwrap();
    assert!(merged.is_empty());
    assert_eq!(merged.dimension, common::LETTER_DIM);
}
