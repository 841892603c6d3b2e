//! Page-to-section resolution from a table of contents.

use super::DocumentError;
use super::config::TocPolicy;
use super::types::TocEntry;

/// A table of contents prepared for page lookups.
///
/// Section ordinal 0 is the sentinel for pages before the first entry;
/// ordinal `i + 1` is the i-th entry in start-page order.
#[derive(Debug, Clone)]
pub struct TableOfContents {
    titles: Vec<String>,
    /// Start pages (1-based) for ordinals 1.., ascending.
    starts: Vec<u32>,
}

impl TableOfContents {
    /// Prepare entries for lookup under the given policy.
    pub fn resolve(
        entries: &[TocEntry],
        policy: TocPolicy,
        uncategorized_title: &str,
    ) -> Result<Self, DocumentError> {
        let unsorted = entries
            .windows(2)
            .find(|pair| pair[1].start_page < pair[0].start_page);

        let mut ordered: Vec<&TocEntry> = entries.iter().collect();
        if let Some(pair) = unsorted {
            match policy {
                TocPolicy::Strict => {
                    return Err(DocumentError::UnsortedToc {
                        title: pair[1].title.clone(),
                        start_page: pair[1].start_page,
                        previous: pair[0].start_page,
                    });
                }
                TocPolicy::Interval => {
                    tracing::warn!(
                        target: "segmenter",
                        "table of contents not sorted ('{}' at page {} follows page {}), using page intervals",
                        pair[1].title,
                        pair[1].start_page,
                        pair[0].start_page
                    );
                    // Stable: entries sharing a start page keep document order.
                    ordered.sort_by_key(|e| e.start_page);
                }
            }
        }

        let mut titles = Vec::with_capacity(ordered.len() + 1);
        titles.push(uncategorized_title.to_string());
        titles.extend(ordered.iter().map(|e| e.title.clone()));
        let starts = ordered.iter().map(|e| e.start_page).collect();

        Ok(Self { titles, starts })
    }

    /// Section ordinal for a 0-based page index.
    ///
    /// The last entry whose `start_page <= page_index + 1` wins.
    pub fn section_for_page(&self, page_index: usize) -> usize {
        let page_number = page_index as u64 + 1;
        self.starts
            .partition_point(|&start| u64::from(start) <= page_number)
    }

    /// Title for a section ordinal.
    pub fn title(&self, ordinal: usize) -> &str {
        &self.titles[ordinal]
    }

    /// All section titles by ordinal.
    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    /// Number of sections including the sentinel.
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}
