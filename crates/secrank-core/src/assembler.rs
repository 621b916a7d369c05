//! Heading detection and assembly
//!
//! Turns a decoded document into an ordered, de-duplicated heading list:
//!
//! ```text
//! spans → numbering merge → tiering → noise filter → classify
//!       → fragment merge → heading noise / body filter → dedup
//! ```
//!
//! Classification trusts the size tier whenever it maps onto a level and
//! falls back to the optional [`FallbackClassifier`] otherwise.

use crate::classifier::{FallbackClassifier, FeatureVector, Label};
use crate::filters::{is_heading_noise, is_noise_span, median_size, BodyFilter};
use crate::span::{normalize_spans, DecodedDocument, Span};
use crate::tiering::{HeadingLevel, KMeansTiers, TierMap, TierStrategy};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

static SECTION_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)*$").expect("valid regex"));

/// Where a candidate's level came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadingSource {
    TierDerived(HeadingLevel),
    ClassifierDerived(HeadingLevel),
}

impl HeadingSource {
    pub const fn level(&self) -> HeadingLevel {
        match self {
            Self::TierDerived(level) | Self::ClassifierDerived(level) => *level,
        }
    }
}

/// A classified span on its way to becoming a heading.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub span: Span,
    pub source: HeadingSource,
}

impl Candidate {
    pub fn level(&self) -> HeadingLevel {
        self.source.level()
    }

    fn absorbs(&self, next: &Candidate, tolerance: &MergeTolerance) -> bool {
        self.span.page == next.span.page
            && (next.span.bbox.y0 - self.span.bbox.y0).abs() < tolerance.max_dy
            && (next.span.bbox.x0 - self.span.bbox.x0).abs() < tolerance.max_dx
            && self.level() == next.level()
    }

    fn into_heading(self) -> Heading {
        Heading {
            level: self.level(),
            text: self.span.text.trim().to_string(),
            page: self.span.page,
            y0: self.span.bbox.y0,
        }
    }
}

/// A detected heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub level: HeadingLevel,
    pub text: String,
    /// 1-based page number
    pub page: u32,
    /// Top of the heading's first fragment
    pub y0: f32,
}

/// How close two same-level fragments must be to form one heading
/// (`[assembly]` in the settings file).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeTolerance {
    /// Maximum vertical offset between fragment tops
    pub max_dy: f32,
    /// Maximum horizontal offset between fragment left edges
    pub max_dx: f32,
}

impl Default for MergeTolerance {
    fn default() -> Self {
        Self {
            max_dy: 6.0,
            max_dx: 20.0,
        }
    }
}

/// Reattach section numbers the decoder split from their titles.
///
/// A span whose whole text is a section number (`3`, `3.2`, `1.4.2`) and
/// that has a successor is dropped, and its text is prepended to the next
/// span. Runs of numbers chain onto the first following span. Operates in
/// extraction order.
pub fn merge_section_numbers(spans: Vec<Span>) -> Vec<Span> {
    let mut merged = Vec::with_capacity(spans.len());
    let mut prefix: Option<String> = None;
    let mut iter = spans.into_iter().peekable();

    while let Some(span) = iter.next() {
        if SECTION_NUMBER.is_match(&span.text) && iter.peek().is_some() {
            prefix = Some(match prefix.take() {
                Some(p) => format!("{p} {}", span.text),
                None => span.text,
            });
            continue;
        }

        match prefix.take() {
            Some(p) => {
                let text = format!("{p} {}", span.text);
                merged.push(span.with_text(text));
            }
            None => merged.push(span),
        }
    }

    merged
}

/// Merge consecutive fragments of the same heading.
///
/// Candidates must be in `(page, y0)` order. A fragment joins the current
/// heading when it is on the same page, has the same level, and its top-left
/// corner lies within `tolerance` of the heading's first fragment. Running
/// the pass on its own output merges nothing further.
pub fn merge_fragments(candidates: Vec<Candidate>, tolerance: &MergeTolerance) -> Vec<Candidate> {
    let mut iter = candidates.into_iter();
    let Some(mut current) = iter.next() else {
        return Vec::new();
    };

    let mut merged = Vec::new();
    for next in iter {
        if current.absorbs(&next, tolerance) {
            let text = format!("{} {}", current.span.text, next.span.text);
            current.span = current.span.with_text(text);
            current.span.bbox.x1 = next.span.bbox.x1;
            current.span.bbox.y1 = next.span.bbox.y1;
        } else {
            merged.push(std::mem::replace(&mut current, next));
        }
    }
    merged.push(current);
    merged
}

/// Drop headings whose (level, lowercased trimmed text) was already seen.
/// Keeps first occurrences in order.
pub fn dedup_headings(headings: Vec<Heading>) -> Vec<Heading> {
    let mut seen = HashSet::new();
    headings
        .into_iter()
        .filter(|h| seen.insert((h.level, h.text.trim().to_lowercase())))
        .collect()
}

/// Detects headings in decoded documents.
pub struct HeadingDetector {
    strategy: Box<dyn TierStrategy>,
    classifier: Option<Arc<dyn FallbackClassifier>>,
    tolerance: MergeTolerance,
    body: BodyFilter,
}

impl Default for HeadingDetector {
    fn default() -> Self {
        Self::new(Box::new(KMeansTiers::default()))
    }
}

impl std::fmt::Debug for HeadingDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadingDetector")
            .field("strategy", &self.strategy.name())
            .field("classifier", &self.classifier.as_ref().map(|c| c.name().to_string()))
            .field("tolerance", &self.tolerance)
            .field("body", &self.body)
            .finish()
    }
}

impl HeadingDetector {
    pub fn new(strategy: Box<dyn TierStrategy>) -> Self {
        Self {
            strategy,
            classifier: None,
            tolerance: MergeTolerance::default(),
            body: BodyFilter::default(),
        }
    }

    /// Use a fallback classifier for spans whose tier has no level.
    pub fn with_classifier(mut self, classifier: Arc<dyn FallbackClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_tolerance(mut self, tolerance: MergeTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_body_filter(mut self, body: BodyFilter) -> Self {
        self.body = body;
        self
    }

    /// Detect the headings of a document, ordered by `(page, y0)`.
    pub fn detect(&self, doc: &DecodedDocument) -> Vec<Heading> {
        let spans = normalize_spans(doc);
        if spans.is_empty() {
            return Vec::new();
        }

        let sizes: Vec<f32> = spans.iter().map(|s| s.size).collect();
        let tiers = self.strategy.assign(&sizes);
        let median = median_size(&spans);
        debug!(
            "{}: {} spans, {} tiers ({}), median size {:.1}",
            doc.id,
            spans.len(),
            tiers.tier_count(),
            self.strategy.name(),
            median
        );

        let candidates: Vec<Candidate> = spans
            .into_iter()
            .filter(|s| !is_noise_span(&s.text))
            .filter_map(|s| self.classify(s, &tiers))
            .collect();

        let headings: Vec<Heading> = merge_fragments(candidates, &self.tolerance)
            .into_iter()
            .filter(|c| {
                !is_heading_noise(&c.span.text)
                    && !self.body.is_body(&c.span.text, c.span.size, median, c.span.gap)
            })
            .map(Candidate::into_heading)
            .collect();

        let headings = dedup_headings(headings);
        debug!("{}: {} headings", doc.id, headings.len());
        headings
    }

    /// Resolve a span's level from its tier, or from the fallback
    /// classifier when the tier is inconclusive.
    pub fn classify(&self, span: Span, tiers: &TierMap) -> Option<Candidate> {
        let source = match tiers.level_of(span.size) {
            Some(level) => HeadingSource::TierDerived(level),
            None => {
                let classifier = self.classifier.as_ref()?;
                match classifier.predict(&FeatureVector::from_span(&span)) {
                    Ok(Label::Heading(level)) => HeadingSource::ClassifierDerived(level),
                    Ok(Label::Other) => return None,
                    Err(e) => {
                        warn!(
                            "{} failed on span {:?} (page {}): {}",
                            classifier.name(),
                            span.text,
                            span.page,
                            e
                        );
                        return None;
                    }
                }
            }
        };
        Some(Candidate { span, source })
    }
}

/// One outline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub level: HeadingLevel,
    pub text: String,
    pub page: u32,
}

/// Document title plus heading outline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    /// Text of the first H1, empty if there is none
    pub title: String,
    pub outline: Vec<OutlineEntry>,
}

impl Outline {
    pub fn from_headings(headings: &[Heading]) -> Self {
        let title = headings
            .iter()
            .find(|h| h.level == HeadingLevel::H1)
            .map(|h| h.text.clone())
            .unwrap_or_default();
        let outline = headings
            .iter()
            .map(|h| OutlineEntry {
                level: h.level,
                text: h.text.clone(),
                page: h.page,
            })
            .collect();
        Self { title, outline }
    }
}
