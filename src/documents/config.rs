//! Configuration types for document segmentation.

use serde::{Deserialize, Serialize};

use super::types::UNCATEGORIZED_SECTION;

/// Configuration for splitting page text into chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters. The last chunk of a page may be shorter.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// How page-to-section assignment treats the table of contents.
    #[serde(default)]
    pub toc_policy: TocPolicy,

    /// Title for pages before the first table-of-contents entry.
    #[serde(default = "default_uncategorized_title")]
    pub uncategorized_title: String,
}

fn default_max_chunk_chars() -> usize {
    500
}

fn default_uncategorized_title() -> String {
    UNCATEGORIZED_SECTION.to_string()
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            toc_policy: TocPolicy::default(),
            uncategorized_title: default_uncategorized_title(),
        }
    }
}

impl ChunkingConfig {
    /// Config with a different chunk budget and defaults elsewhere.
    pub fn with_max_chars(max_chunk_chars: usize) -> Self {
        Self {
            max_chunk_chars,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_chars == 0 {
            return Err("max_chunk_chars must be greater than zero".to_string());
        }

        if self.uncategorized_title.trim().is_empty() {
            return Err("uncategorized_title must not be empty".to_string());
        }

        Ok(())
    }
}

/// Policy for resolving pages against the table of contents.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TocPolicy {
    /// Sort entries by start page (stable) and assign each page to the
    /// last entry starting at or before it. Unsorted input is accepted.
    #[default]
    Interval,
    /// Reject a table of contents that is not sorted by start page.
    Strict,
}
