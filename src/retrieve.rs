//! Coarse-to-fine retrieval over a `DocumentIndex`.
//!
//! The coarse stage ranks sections by their representative vectors; the fine
//! stage ranks only the chunks of the selected sections. With the coarse stage
//! bypassed, the fine stage runs over every chunk. Retrieval never mutates the
//! index and is deterministic for a given index and query vector.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::documents::{ChunkId, DocumentChunk, DocumentIndex};
use crate::semantic::{EmbeddingGenerator, SemanticSearchError, cosine_similarity};

// =============================================================================
// Configuration
// =============================================================================

/// Retrieval bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Sections kept by the coarse stage
    #[serde(default = "default_k_sections")]
    pub k_sections: usize,

    /// Chunks kept by the fine stage
    #[serde(default = "default_k_chunks")]
    pub k_chunks: usize,

    /// Run the coarse stage before the fine stage
    #[serde(default = "default_true")]
    pub use_coarse_stage: bool,
}

fn default_k_sections() -> usize {
    3
}
fn default_k_chunks() -> usize {
    5
}
fn default_true() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_sections: default_k_sections(),
            k_chunks: default_k_chunks(),
            use_coarse_stage: default_true(),
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.k_sections == 0 {
            return Err("retrieval.k_sections must be at least 1".to_string());
        }
        if self.k_chunks == 0 {
            return Err("retrieval.k_chunks must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Whether the coarse stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Rank sections, then chunks within the selected sections.
    CoarseToFine,
    /// Rank every chunk directly.
    Bypass,
}

impl RetrievalMode {
    pub fn from_coarse_flag(use_coarse_stage: bool) -> Self {
        if use_coarse_stage {
            Self::CoarseToFine
        } else {
            Self::Bypass
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Where a passage came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    /// Document tag, present when several indices were merged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub section: String,
    /// 0-based page index
    pub page_index: u32,
}

impl Citation {
    /// Human page number.
    pub fn page_number(&self) -> u32 {
        self.page_index + 1
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(document) = &self.document {
            write!(f, "{document} / ")?;
        }
        write!(f, "{} (page {})", self.section, self.page_number())
    }
}

/// A section picked by the coarse stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSection {
    /// Position of the section in the index
    pub position: usize,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub score: f32,
}

/// A chunk picked by the fine stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub chunk_id: ChunkId,
    pub file_id: String,
    pub page_index: u32,
    pub chunk_index: u32,
    pub content: String,
    pub score: f32,
    pub citation: Citation,
}

/// Ranked, deduplicated passages for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub mode: RetrievalMode,
    /// Sections chosen by the coarse stage (empty in bypass mode).
    pub sections: Vec<RankedSection>,
    pub passages: Vec<RetrievedPassage>,
}

impl RetrievalResult {
    pub fn empty(mode: RetrievalMode) -> Self {
        Self {
            mode,
            sections: Vec::new(),
            passages: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Chunk ids in rank order.
    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.passages.iter().map(|p| p.chunk_id).collect()
    }

    /// Context block handed to the language model.
    ///
    /// ```text
    /// [1] Methods (page 2)
    /// chunk text
    ///
    /// [2] Intro (page 1)
    /// chunk text
    /// ```
    pub fn context(&self) -> String {
        self.passages
            .iter()
            .enumerate()
            .map(|(i, p)| format!("[{}] {}\n{}", i + 1, p.citation, p.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Two-stage nearest-neighbour search.
pub struct RetrievalEngine<'a> {
    generator: &'a dyn EmbeddingGenerator,
    config: RetrievalConfig,
}

impl<'a> RetrievalEngine<'a> {
    pub fn new(generator: &'a dyn EmbeddingGenerator, config: RetrievalConfig) -> Self {
        Self { generator, config }
    }

    /// Embed `question` and retrieve from `index`.
    ///
    /// An empty index yields an empty result without calling the embedder.
    pub fn retrieve(
        &self,
        question: &str,
        index: &DocumentIndex,
        mode: RetrievalMode,
    ) -> Result<RetrievalResult, SemanticSearchError> {
        if index.is_empty() {
            tracing::debug!(target: "retrieve", "empty index, returning empty context");
            return Ok(RetrievalResult::empty(mode));
        }

        let query = self.generator.embed(question)?;
        check_query_dimension(&query, index)?;

        Ok(self.retrieve_with_vector(&query, index, mode))
    }

    /// Retrieve with an already embedded query.
    pub fn retrieve_with_vector(
        &self,
        query: &[f32],
        index: &DocumentIndex,
        mode: RetrievalMode,
    ) -> RetrievalResult {
        if index.is_empty() {
            return RetrievalResult::empty(mode);
        }

        let owners = section_owners(index);

        let (sections, candidates): (Vec<RankedSection>, Vec<&DocumentChunk>) = match mode {
            RetrievalMode::CoarseToFine => {
                let sections = self.rank_sections(query, index);
                let mut seen = HashSet::new();
                let candidates = sections
                    .iter()
                    .flat_map(move |s| index.section_chunks(&index.sections[s.position]))
                    .filter(|c| seen.insert(c.id))
                    .collect();
                (sections, candidates)
            }
            RetrievalMode::Bypass => (Vec::new(), index.chunks.iter().collect()),
        };

        let candidate_count = candidates.len();
        let passages = self.rank_chunks(query, candidates, index, &owners);

        tracing::debug!(
            target: "retrieve",
            "{mode:?}: {} sections, {candidate_count} candidates, {} passages",
            sections.len(),
            passages.len()
        );

        RetrievalResult {
            mode,
            sections,
            passages,
        }
    }

    /// Coarse stage: top `k_sections` non-empty sections by similarity.
    ///
    /// Ties keep index order. Sections without chunks are never selected.
    pub fn rank_sections(&self, query: &[f32], index: &DocumentIndex) -> Vec<RankedSection> {
        let mut scored: Vec<(usize, f32)> = index
            .sections
            .iter()
            .enumerate()
            .filter(|(_, section)| !section.is_empty())
            .map(|(position, section)| (position, score(query, &section.representative)))
            .collect();

        scored.sort_by(|a, b| by_score_desc(a.1, b.1).then(a.0.cmp(&b.0)));
        scored.truncate(self.config.k_sections);

        scored
            .into_iter()
            .map(|(position, score)| {
                let section = &index.sections[position];
                RankedSection {
                    position,
                    title: section.title.clone(),
                    document: section.document.clone(),
                    score,
                }
            })
            .collect()
    }

    /// Fine stage: top `k_chunks` candidates, skipping repeats.
    ///
    /// Ties are broken by `(page_index, chunk_index)` ascending, then index
    /// order. A candidate is a repeat when its `(file, page, chunk)` key was
    /// already selected. Identical text under different keys is kept.
    fn rank_chunks(
        &self,
        query: &[f32],
        candidates: Vec<&DocumentChunk>,
        index: &DocumentIndex,
        owners: &[Option<usize>],
    ) -> Vec<RetrievedPassage> {
        let mut scored: Vec<(&DocumentChunk, f32)> = candidates
            .into_iter()
            .map(|chunk| (chunk, score(query, &chunk.embedding)))
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| {
            by_score_desc(*sa, *sb)
                .then(a.key().cmp(&b.key()))
                .then(a.id.cmp(&b.id))
        });

        let mut seen_keys: HashSet<(&str, u32, u32)> = HashSet::new();
        let mut passages = Vec::with_capacity(self.config.k_chunks);

        for (chunk, score) in scored {
            if passages.len() >= self.config.k_chunks {
                break;
            }
            let key = (chunk.file_id.as_str(), chunk.page_index, chunk.chunk_index);
            if !seen_keys.insert(key) {
                continue;
            }

            let document = owners
                .get(chunk.id.ordinal())
                .copied()
                .flatten()
                .and_then(|position| index.sections[position].document.clone());

            passages.push(RetrievedPassage {
                chunk_id: chunk.id,
                file_id: chunk.file_id.clone(),
                page_index: chunk.page_index,
                chunk_index: chunk.chunk_index,
                content: chunk.content.clone(),
                score,
                citation: Citation {
                    document,
                    section: chunk.section_title.clone(),
                    page_index: chunk.page_index,
                },
            });
        }

        passages
    }
}

/// Reject a query vector whose length differs from the index dimension.
pub fn check_query_dimension(
    query: &[f32],
    index: &DocumentIndex,
) -> Result<(), SemanticSearchError> {
    if query.len() != index.dimension {
        return Err(SemanticSearchError::DimensionMismatch {
            expected: index.dimension,
            actual: query.len(),
        });
    }
    Ok(())
}

/// Owning section position for every chunk ordinal.
fn section_owners(index: &DocumentIndex) -> Vec<Option<usize>> {
    let mut owners = vec![None; index.chunks.len()];
    for (position, section) in index.sections.iter().enumerate() {
        for id in &section.chunk_ids {
            if let Some(slot) = owners.get_mut(id.ordinal()) {
                *slot = Some(position);
            }
        }
    }
    owners
}

fn score(query: &[f32], vector: &[f32]) -> f32 {
    let s = cosine_similarity(query, vector);
    if s.is_nan() { f32::NEG_INFINITY } else { s }
}

fn by_score_desc(a: f32, b: f32) -> Ordering {
    b.total_cmp(&a)
}
