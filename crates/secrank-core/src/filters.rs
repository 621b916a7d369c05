//! Noise and body-text filters for heading candidates.
//!
//! `is_noise_span` runs on raw spans before classification. `is_heading_noise`
//! and `is_probably_body` run on assembled headings.

use crate::span::Span;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Candidates at or above `median * BODY_SIZE_RATIO` are never body text
/// on size grounds alone.
pub const BODY_SIZE_RATIO: f32 = 1.05;

/// Gap (layout units) under which same-size text reads as running body.
pub const BODY_MAX_GAP: f32 = 8.0;

/// Headings with more words than this are sentences, not headings.
pub const BODY_MAX_WORDS: usize = 6;

/// Shortest heading text kept after assembly.
pub const MIN_HEADING_CHARS: usize = 3;

static BARE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}([.-]\d{1,2}){0,2}$").expect("valid regex"));

static SHORT_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{4}$")
        .expect("valid regex")
});

static HEADING_NOISE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // numbering only: "3", "12."
        r"^\d+\.?$",
        // 12/05/2024, 1.2.24, 03-04-2023
        r"^(\d{1,2}[./-]){2}\d{2,4}$",
        // 2024-05-12
        r"^\d{4}[./-]\d{1,2}[./-]\d{1,2}$",
        r"^\d{1,2}/\d{1,2}/\d{2,4}$",
        // 5 March 2024
        r"^\d{1,2}\s+[A-Za-z]{3,9}\s+\d{4}$",
        // March 2024
        r"^[A-Za-z]{3,9}\s+\d{4}$",
        // March 5, 2024
        r"^[A-Za-z]{3,9}\s+\d{1,2},\s+\d{4}$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Spans that can never be heading text: bare numbers ("3", "3.2", "3-2")
/// and abbreviated month-year stamps ("Mar 2023").
pub fn is_noise_span(text: &str) -> bool {
    let text = text.trim();
    BARE_NUMBER.is_match(text) || SHORT_MONTH_YEAR.is_match(text)
}

/// Assembled headings that are numbering, dates, or too short.
pub fn is_heading_noise(text: &str) -> bool {
    let text = text.trim();
    HEADING_NOISE.iter().any(|re| re.is_match(text)) || text.chars().count() < MIN_HEADING_CHARS
}

/// Thresholds for telling running body text from headings
/// (`[filters]` in the settings file).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyFilter {
    pub size_ratio: f32,
    pub max_gap: f32,
    pub max_words: usize,
}

impl Default for BodyFilter {
    fn default() -> Self {
        Self {
            size_ratio: BODY_SIZE_RATIO,
            max_gap: BODY_MAX_GAP,
            max_words: BODY_MAX_WORDS,
        }
    }
}

impl BodyFilter {
    /// Whether a heading candidate is really running body text.
    ///
    /// Text at roughly body size that follows closely on the previous line
    /// is body. Long or sentence-like text is body regardless of size and gap.
    pub fn is_body(&self, text: &str, size: f32, median_size: f32, gap: f32) -> bool {
        if size < median_size * self.size_ratio && gap < self.max_gap {
            return true;
        }
        text.split_whitespace().count() > self.max_words || text.ends_with('.')
    }
}

/// [`BodyFilter::is_body`] with the default thresholds.
pub fn is_probably_body(text: &str, size: f32, median_size: f32, gap: f32) -> bool {
    BodyFilter::default().is_body(text, size, median_size, gap)
}

/// Median font size over a document's spans, 1.0 when there are none.
pub fn median_size(spans: &[Span]) -> f32 {
    if spans.is_empty() {
        return 1.0;
    }
    let mut sizes: Vec<f32> = spans.iter().map(|s| s.size).collect();
    sizes.sort_by(f32::total_cmp);
    let mid = sizes.len() / 2;
    if sizes.len() % 2 == 0 {
        (sizes[mid - 1] + sizes[mid]) / 2.0
    } else {
        sizes[mid]
    }
}
