//! Page segmentation.
//!
//! Provides the `Chunker` trait for splitting one page of text, and the
//! `Segmenter` that applies it to every page of a document, tagging chunks
//! with page, intra-page index and section title.

use super::DocumentError;
use super::config::ChunkingConfig;
use super::toc::TableOfContents;
use super::types::{ExtractedDocument, RawChunk, SegmentedDocument};

/// Trait for page chunking strategies.
pub trait Chunker: Send + Sync {
    /// Split one page of text into non-empty chunk texts, in order.
    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Vec<String>;
}

/// Fixed-window chunker.
///
/// Algorithm:
/// 1. Clean the text (collapse whitespace runs, drop control characters)
/// 2. Cut non-overlapping windows of `max_chunk_chars` characters
/// 3. Trim each window and drop the ones left empty
#[derive(Debug, Default)]
pub struct FixedWindowChunker;

impl FixedWindowChunker {
    pub fn new() -> Self {
        Self
    }
}

impl Chunker for FixedWindowChunker {
    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Vec<String> {
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return Vec::new();
        }

        let window = config.max_chunk_chars.max(1);
        let mut boundaries: Vec<usize> = cleaned
            .char_indices()
            .map(|(i, _)| i)
            .step_by(window)
            .collect();
        boundaries.push(cleaned.len());

        boundaries
            .windows(2)
            .map(|w| cleaned[w[0]..w[1]].trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Collapse every whitespace run to a single space, remove other control
/// characters, and trim both ends.
pub fn clean_text(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = !cleaned.is_empty();
        } else if !c.is_control() {
            if pending_space {
                cleaned.push(' ');
                pending_space = false;
            }
            cleaned.push(c);
        }
    }

    cleaned
}

/// Splits a document's pages into section-tagged chunks.
pub struct Segmenter {
    config: ChunkingConfig,
    chunker: Box<dyn Chunker>,
}

impl std::fmt::Debug for Segmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segmenter")
            .field("config", &self.config)
            .finish()
    }
}

impl Segmenter {
    /// Create a segmenter using the fixed-window chunker.
    pub fn new(config: ChunkingConfig) -> Result<Self, DocumentError> {
        Self::with_chunker(config, Box::new(FixedWindowChunker::new()))
    }

    /// Create a segmenter with a custom chunking strategy.
    pub fn with_chunker(
        config: ChunkingConfig,
        chunker: Box<dyn Chunker>,
    ) -> Result<Self, DocumentError> {
        config.validate().map_err(DocumentError::InvalidConfig)?;
        Ok(Self { config, chunker })
    }

    /// Segment every page of the document.
    ///
    /// Pages without extractable text produce no chunks. Chunk indices are
    /// assigned after empty windows are dropped, so they never have gaps.
    pub fn segment(&self, document: &ExtractedDocument) -> Result<SegmentedDocument, DocumentError> {
        let toc = TableOfContents::resolve(
            &document.toc,
            self.config.toc_policy,
            &self.config.uncategorized_title,
        )?;

        let mut chunks = Vec::new();
        let mut empty_pages = 0usize;

        for (page_index, text) in document.pages_text.iter().enumerate() {
            let section_index = toc.section_for_page(page_index);
            let section_title = toc.title(section_index);

            let pieces = self.chunker.chunk(text, &self.config);
            if pieces.is_empty() {
                empty_pages += 1;
                continue;
            }

            chunks.extend(pieces.into_iter().enumerate().map(|(chunk_index, content)| {
                RawChunk {
                    page_index: page_index as u32,
                    chunk_index: chunk_index as u32,
                    section_index,
                    section_title: section_title.to_string(),
                    content,
                }
            }));
        }

        tracing::debug!(
            target: "segmenter",
            "{}: {} pages, {} chunks, {} empty pages, {} sections",
            document.file_path,
            document.pages_text.len(),
            chunks.len(),
            empty_pages,
            toc.len()
        );

        Ok(SegmentedDocument {
            file_id: document.file_path.clone(),
            section_titles: toc.titles().to_vec(),
            chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::types::TocEntry;

    fn config(max: usize) -> ChunkingConfig {
        ChunkingConfig::with_max_chars(max)
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a \n\n b\t\tc  "), "a b c");
        assert_eq!(clean_text("x\u{0007}y"), "xy");
        assert_eq!(clean_text(" \n\t "), "");
    }

    #[test]
    fn test_empty_content() {
        let chunks = FixedWindowChunker::new().chunk("   \n  ", &config(10));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_windows_are_fixed_size() {
        let text = "a".repeat(25);
        let chunks = FixedWindowChunker::new().chunk(&text, &config(10));
        let lengths: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lengths, vec![10, 10, 5]);
    }

    #[test]
    fn test_window_trimmed_at_space_boundary() {
        // Cleaned: "abcd efgh" -> windows "abcd " and "efgh"
        let chunks = FixedWindowChunker::new().chunk("abcd   efgh", &config(5));
        assert_eq!(chunks, vec!["abcd", "efgh"]);
    }

    #[test]
    fn test_whitespace_only_window_is_dropped() {
        // Cleaned: "ab cd" -> windows "ab", " c", "d" with size 2
        let chunks = FixedWindowChunker::new().chunk("ab cd", &config(2));
        assert_eq!(chunks, vec!["ab", "c", "d"]);

        // Cleaned: "a b" -> windows "a", " ", "b"; the lone space is dropped
        let chunks = FixedWindowChunker::new().chunk("a b", &config(1));
        assert_eq!(chunks, vec!["a", "b"]);
    }

    #[test]
    fn test_multibyte_text_windows_by_chars() {
        let text = "가나다라마바사";
        let chunks = FixedWindowChunker::new().chunk(text, &config(3));
        assert_eq!(chunks, vec!["가나다", "라마바", "사"]);
    }

    #[test]
    fn test_segment_numbers_chunks_without_gaps() {
        let segmenter = Segmenter::new(config(1)).unwrap();
        let doc = ExtractedDocument::new(
            "doc.pdf",
            vec![TocEntry::new(1, "Intro", 1)],
            vec!["a b".to_string(), String::new(), "c".to_string()],
        );
        let segmented = segmenter.segment(&doc).unwrap();

        let keys: Vec<(u32, u32)> = segmented
            .chunks
            .iter()
            .map(|c| (c.page_index, c.chunk_index))
            .collect();
        assert_eq!(keys, vec![(0, 0), (0, 1), (2, 0)]);
        assert!(segmented.chunks.iter().all(|c| c.section_title == "Intro"));
        assert_eq!(segmented.section_titles.len(), 2);
    }

    #[test]
    fn test_segment_rejects_invalid_config() {
        assert!(matches!(
            Segmenter::new(config(0)),
            Err(DocumentError::InvalidConfig(_))
        ));
    }
}
