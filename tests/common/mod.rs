//! Deterministic embedders and documents shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use querydoc::documents::{ExtractedDocument, TocEntry};
use querydoc::semantic::{EmbeddingGenerator, SemanticSearchError};

pub const LETTER_DIM: usize = 27;

/// Embeds text as its a-z letter histogram plus a small constant term.
///
/// Texts made of one repeated letter land on their own axis, so the nearest
/// section or chunk for a query is easy to predict.
#[derive(Debug, Default)]
pub struct LetterEmbedder {
    calls: AtomicUsize,
}

impl LetterEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn letter_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; LETTER_DIM];
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() {
            vector[(c as u8 - b'a') as usize] += 1.0;
        }
    }
    vector[LETTER_DIM - 1] = 0.01;
    vector
}

impl EmbeddingGenerator for LetterEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticSearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(letter_vector(text))
    }

    fn dimension(&self) -> usize {
        LETTER_DIM
    }

    fn model_name(&self) -> &str {
        "letters"
    }
}

/// Letter embedder that rejects any text containing `marker`.
#[derive(Debug)]
pub struct FailingEmbedder {
    pub marker: &'static str,
}

impl EmbeddingGenerator for FailingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticSearchError> {
        if text.contains(self.marker) {
            Err(SemanticSearchError::EmbeddingError(format!(
                "refusing text with {}",
                self.marker
            )))
        } else {
            Ok(letter_vector(text))
        }
    }

    fn dimension(&self) -> usize {
        LETTER_DIM
    }

    fn model_name(&self) -> &str {
        "letters"
    }
}

/// Letter embedder that sleeps before every call.
#[derive(Debug)]
pub struct SlowEmbedder {
    pub delay: Duration,
}

impl EmbeddingGenerator for SlowEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticSearchError> {
        std::thread::sleep(self.delay);
        Ok(letter_vector(text))
    }

    fn dimension(&self) -> usize {
        LETTER_DIM
    }

    fn model_name(&self) -> &str {
        "letters"
    }
}

/// Two pages: 1200 `a`s under "Intro", 300 `b`s under "Methods".
pub fn intro_methods_document() -> ExtractedDocument {
    ExtractedDocument::new(
        "papers/study.pdf",
        vec![TocEntry::new(1, "Intro", 1), TocEntry::new(1, "Methods", 2)],
        vec!["a".repeat(1200), "b".repeat(300)],
    )
}

/// Four pages over three sections, each page dominated by its own letters.
pub fn survey_document() -> ExtractedDocument {
    ExtractedDocument::new(
        "papers/survey.pdf",
        vec![
            TocEntry::new(1, "Background", 1),
            TocEntry::new(1, "Design", 2),
            TocEntry::new(2, "Results", 4),
        ],
        vec![
            "aaaa aaaa bbb ".repeat(20),
            "cccc cccc dd ".repeat(30),
            "cccc eeee ".repeat(15),
            "ffff ffff gg ".repeat(25),
        ],
    )
}
