//! On-disk index store: round trips, corruption and replacement.

mod common;

use std::fs;
use std::sync::Arc;

use common::LetterEmbedder;
use querydoc::documents::{ChunkingConfig, ExtractedDocument, Segmenter};
use querydoc::indexing::{BuildOptions, IndexBuilder};
use querydoc::storage::{FileIndexStore, IndexMetadata, IndexStore, StoredIndex};
use tempfile::TempDir;

fn stored_for(document: &ExtractedDocument) -> StoredIndex {
    let builder = IndexBuilder::new(
        Segmenter::new(ChunkingConfig::with_max_chars(120)).unwrap(),
        Arc::new(LetterEmbedder::new()),
        BuildOptions {
            threads: 1,
            ..Default::default()
        },
    )
    .unwrap();
    let index = builder.build(document).unwrap().index;
    StoredIndex {
        metadata: IndexMetadata::new(document, "letters", &index),
        index,
    }
}

#[test]
fn test_built_index_survives_reload() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileIndexStore::new(temp_dir.path());
    let stored = stored_for(&common::survey_document());

    store.replace(&stored).unwrap();
    let loaded = store.load("survey").expect("stored index should load");

    assert_eq!(loaded, stored);
    assert_eq!(loaded.metadata.chunk_count, stored.index.chunk_count());
    assert!(
        loaded
            .index
            .sections
            .iter()
            .all(|s| s.representative.len() == loaded.index.dimension)
    );
}

#[test]
fn test_truncated_chunks_file_is_a_miss() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileIndexStore::new(temp_dir.path());
    store.replace(&stored_for(&common::intro_methods_document())).unwrap();

    let chunks_path = temp_dir.path().join("study").join("chunks.bin");
    let bytes = fs::read(&chunks_path).unwrap();
    fs::write(&chunks_path, &bytes[..bytes.len() / 2]).unwrap();

    assert!(store.load("study").is_none());
    // A miss is still listed; the next build replaces it.
    assert_eq!(store.list().unwrap(), vec!["study".to_string()]);
}

#[test]
fn test_sections_without_chunks_file_is_a_miss() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileIndexStore::new(temp_dir.path());
    store.replace(&stored_for(&common::intro_methods_document())).unwrap();

    fs::remove_file(temp_dir.path().join("study").join("chunks.bin")).unwrap();
    assert!(store.load("study").is_none());
    assert!(!store.persistence().exists("study"));
}

#[test]
fn test_replace_swaps_both_artifacts() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileIndexStore::new(temp_dir.path());

    let first = common::intro_methods_document();
    store.replace(&stored_for(&first)).unwrap();

    let mut second = first.clone();
    second.pages_text.push("c".repeat(250));
    let replacement = stored_for(&second);
    store.replace(&replacement).unwrap();

    let loaded = store.load("study").unwrap();
    assert_eq!(loaded.metadata.source_hash, second.content_hash());
    assert_eq!(loaded.index.chunk_count(), replacement.index.chunk_count());

    // No staging or backup directories are left behind.
    let entries: Vec<String> = fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec!["study".to_string()]);
}

#[test]
fn test_list_ignores_hidden_leftovers() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileIndexStore::new(temp_dir.path());
    store.replace(&stored_for(&common::survey_document())).unwrap();
    store.replace(&stored_for(&common::intro_methods_document())).unwrap();
    fs::create_dir(temp_dir.path().join(".staging-abandoned")).unwrap();

    assert_eq!(
        store.list().unwrap(),
        vec!["study".to_string(), "survey".to_string()]
    );

    assert!(store.delete("survey").unwrap());
    assert!(!store.delete("survey").unwrap());
    assert_eq!(store.list().unwrap(), vec!["study".to_string()]);
}
