//! Section representation: aggregate member chunk vectors per section.

use serde::{Deserialize, Serialize};

use super::embed::EmbeddedChunk;
use crate::documents::{DocumentChunk, Section};

/// How member chunk vectors are combined into a section vector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Arithmetic mean of member vectors. Order-independent.
    #[default]
    Mean,
    /// Mean weighted by member chunk length in characters.
    LengthWeighted,
}

/// Builds sections and their representative vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionBuilder {
    policy: AggregationPolicy,
}

impl SectionBuilder {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self { policy }
    }

    /// Group embedded chunks by section and compute representatives.
    ///
    /// `section_titles` is indexed by section ordinal. Ordinal 0 (pages
    /// before the first table-of-contents entry) is emitted only when it
    /// has members; every other section is emitted even when empty, with a
    /// zero representative.
    pub fn build(
        &self,
        section_titles: &[String],
        embedded: Vec<EmbeddedChunk>,
        dimension: usize,
    ) -> (Vec<Section>, Vec<DocumentChunk>) {
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); section_titles.len()];
        for (position, item) in embedded.iter().enumerate() {
            match members.get_mut(item.section_index) {
                Some(list) => list.push(position),
                None => tracing::warn!(
                    target: "sections",
                    "chunk {} refers to unknown section {}",
                    item.chunk.id.value(),
                    item.section_index
                ),
            }
        }

        let chunks: Vec<DocumentChunk> = embedded.into_iter().map(|e| e.chunk).collect();

        let sections: Vec<Section> = section_titles
            .iter()
            .zip(members)
            .enumerate()
            .filter(|(ordinal, (_, positions))| *ordinal > 0 || !positions.is_empty())
            .map(|(_, (title, positions))| {
                let member_chunks: Vec<&DocumentChunk> =
                    positions.iter().map(|&p| &chunks[p]).collect();
                Section {
                    title: title.clone(),
                    document: None,
                    chunk_ids: member_chunks.iter().map(|c| c.id).collect(),
                    representative: self.aggregate(&member_chunks, dimension),
                }
            })
            .collect();

        let empty = sections.iter().filter(|s| s.is_empty()).count();
        tracing::debug!(
            target: "sections",
            "built {} sections ({} without chunks) over {} chunks",
            sections.len(),
            empty,
            chunks.len()
        );

        (sections, chunks)
    }

    /// Representative vector for a set of member chunks.
    ///
    /// Zero members (or zero total weight) yields the zero vector.
    pub fn aggregate(&self, members: &[&DocumentChunk], dimension: usize) -> Vec<f32> {
        let mut sum = vec![0.0f32; dimension];
        let mut total_weight = 0.0f32;

        for chunk in members {
            let weight = match self.policy {
                AggregationPolicy::Mean => 1.0,
                AggregationPolicy::LengthWeighted => chunk.char_count() as f32,
            };
            for (acc, value) in sum.iter_mut().zip(&chunk.embedding) {
                *acc += weight * value;
            }
            total_weight += weight;
        }

        if total_weight > 0.0 {
            for value in &mut sum {
                *value /= total_weight;
            }
        }
        sum
    }
}
