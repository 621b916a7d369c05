//! Positioned text spans and their normalization.
//!
//! A decoder yields [`RawSpan`]s in extraction order together with the plain
//! text of every page. [`normalize_spans`] turns them into [`Span`]s carrying
//! the layout signals the heading detector works from: rounded size, bold and
//! centered flags, and the vertical gap to the previous span on the page.

use crate::assembler::merge_section_numbers;
use serde::{Deserialize, Serialize};

/// Fraction of the page width a span's center may deviate from the page
/// center and still count as centered.
const CENTER_TOLERANCE: f32 = 0.15;

/// Bounding box in page coordinates, top-left origin (points).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Width of the box.
    #[inline]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    /// Horizontal center of the box.
    #[inline]
    pub fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }
}

/// A styled run of text as produced by a decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpan {
    /// 1-based page number
    pub page: u32,
    pub text: String,
    /// Font size in points
    pub size: f32,
    /// Font name as reported by the decoder (e.g. `Arial-BoldMT`)
    #[serde(default)]
    pub font: String,
    pub bbox: BBox,
}

/// Plain text and dimensions of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number
    pub number: u32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    pub text: String,
}

/// Everything a decoder extracts from one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedDocument {
    /// Document identifier (file name for files on disk)
    pub id: String,
    /// Pages in order
    pub pages: Vec<PageText>,
    /// Spans in extraction order
    #[serde(default)]
    pub spans: Vec<RawSpan>,
}

impl DecodedDocument {
    /// Number of the last page, or 0 for an empty document.
    pub fn last_page(&self) -> u32 {
        self.pages.iter().map(|p| p.number).max().unwrap_or(0)
    }

    /// Plain text of every page, indexed by `page_number - 1`.
    ///
    /// Pages missing from the decoder output come back as empty strings.
    pub fn page_texts(&self) -> Vec<&str> {
        let mut texts = vec![""; self.last_page() as usize];
        for page in &self.pages {
            if page.number >= 1 {
                texts[page.number as usize - 1] = page.text.as_str();
            }
        }
        texts
    }

    fn page_width(&self, number: u32) -> Option<f32> {
        self.pages
            .iter()
            .find(|p| p.number == number)
            .map(|p| p.width)
            .filter(|w| *w > 0.0)
    }
}

/// A normalized span, the unit of layout analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub page: u32,
    pub text: String,
    /// Lowercased text with punctuation stripped
    pub norm_text: String,
    /// Font size rounded to one decimal
    pub size: f32,
    pub font: String,
    pub bbox: BBox,
    /// Vertical distance to the previous span on the same page
    pub gap: f32,
    pub is_bold: bool,
    pub centered: bool,
}

impl Span {
    /// Build a span from raw decoder output. `gap` starts at zero and is
    /// filled in once spans are in reading order.
    pub fn from_raw(raw: &RawSpan, text: &str, page_width: Option<f32>) -> Self {
        let centered = page_width.is_some_and(|width| {
            (raw.bbox.center_x() - width / 2.0).abs() < width * CENTER_TOLERANCE
        });

        Self {
            page: raw.page,
            text: text.to_string(),
            norm_text: normalize_text(text),
            size: round_size(raw.size),
            font: raw.font.clone(),
            bbox: raw.bbox,
            gap: 0.0,
            is_bold: raw.font.contains("Bold"),
            centered,
        }
    }

    /// Replace the text, keeping `norm_text` in sync.
    pub fn with_text(mut self, text: String) -> Self {
        self.norm_text = normalize_text(&text);
        self.text = text;
        self
    }
}

/// Round a font size to one decimal place.
#[inline]
pub fn round_size(size: f32) -> f32 {
    (size * 10.0).round() / 10.0
}

/// Lowercase, trim, and strip everything that is neither a word character
/// nor whitespace.
pub fn normalize_text(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

/// Normalize a document's raw spans.
///
/// Drops blank spans, reattaches split section numbers, sorts into reading
/// order by `(page, y0)` and computes each span's gap to its predecessor.
pub fn normalize_spans(doc: &DecodedDocument) -> Vec<Span> {
    let spans: Vec<Span> = doc
        .spans
        .iter()
        .filter_map(|raw| {
            let text = raw.text.trim();
            if text.is_empty() {
                return None;
            }
            Some(Span::from_raw(raw, text, doc.page_width(raw.page)))
        })
        .collect();

    let mut spans = merge_section_numbers(spans);
    sort_reading_order(&mut spans);
    compute_gaps(&mut spans);
    spans
}

/// Stable sort by `(page, y0)`.
pub fn sort_reading_order(spans: &mut [Span]) {
    spans.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then_with(|| a.bbox.y0.total_cmp(&b.bbox.y0))
    });
}

/// Fill in `gap` for spans already in reading order.
fn compute_gaps(spans: &mut [Span]) {
    for i in 0..spans.len() {
        let gap = match i.checked_sub(1).map(|p| &spans[p]) {
            Some(prev) if prev.page == spans[i].page => {
                (spans[i].bbox.y0 - prev.bbox.y1).max(0.0)
            }
            _ => spans[i].bbox.y0,
        };
        spans[i].gap = gap;
    }
}
