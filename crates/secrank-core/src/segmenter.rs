//! Section segmentation
//!
//! Carves a document's per-page text into sections bounded by consecutive
//! headings. Segmentation is page-granular: a section spans every page from
//! its heading's page up to (not including) the next heading's page.

use crate::assembler::Heading;
use serde::{Deserialize, Serialize};

/// Default minimum trimmed section length, in characters
pub const DEFAULT_MIN_SECTION_CHARS: usize = 30;

/// A contiguous span of document text under one heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub document_id: String,
    pub title: String,
    /// First page, 1-based
    pub start_page: u32,
    /// Last page included, 1-based and inclusive
    pub end_page: u32,
    pub content: String,
}

impl Section {
    /// Text fed to the embedder.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.title, self.content)
    }
}

/// Split `pages` into sections, one per heading.
///
/// `pages[i]` holds the text of page `i + 1`. Sections whose trimmed
/// content has fewer than `min_chars` characters are dropped.
pub fn segment_sections(
    document_id: &str,
    headings: &[Heading],
    pages: &[&str],
    min_chars: usize,
) -> Vec<Section> {
    let mut ordered: Vec<&Heading> = headings.iter().collect();
    ordered.sort_by(|a, b| a.page.cmp(&b.page).then_with(|| a.y0.total_cmp(&b.y0)));

    let last_page = pages.len() as u32;
    let mut sections = Vec::with_capacity(ordered.len());

    for (i, heading) in ordered.iter().enumerate() {
        let start = heading.page.max(1);
        // Exclusive end
        let end = match ordered.get(i + 1) {
            Some(next) => next.page,
            None => last_page + 1,
        };

        let content = page_range_text(pages, start, end);
        if content.chars().count() < min_chars {
            continue;
        }

        sections.push(Section {
            document_id: document_id.to_string(),
            title: heading.text.clone(),
            start_page: start,
            end_page: end.saturating_sub(1).max(start),
            content,
        });
    }

    sections
}

/// Joined, trimmed text of pages `[start, end)`, clipped to the document.
fn page_range_text(pages: &[&str], start: u32, end: u32) -> String {
    let from = (start as usize).saturating_sub(1).min(pages.len());
    let to = (end as usize).saturating_sub(1).clamp(from, pages.len());
    pages[from..to].join("\n").trim().to_string()
}
