//! End-to-end section extraction and ranking.
//!
//! Documents are decoded and segmented in parallel (one rayon task per
//! document). Ranking then runs on the caller's thread, which owns the
//! embedder.

use crate::assembler::{HeadingDetector, Outline};
use crate::classifier::FallbackClassifier;
use crate::config::{Query, Settings};
use crate::embedder::{cosine_similarity, l2_normalize, EmbedderBackend, DEFAULT_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::ranking::{query_keywords, score_section, select_diverse, RankOptions, ScoredSection};
use crate::segmenter::{segment_sections, Section, DEFAULT_MIN_SECTION_CHARS};
use crate::source::DocumentSource;
use crate::span::DecodedDocument;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A document that could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

/// Sections of every successfully decoded document.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Sections in input document order
    pub sections: Vec<Section>,
    pub skipped: Vec<SkippedDocument>,
}

/// Result of a full ranking run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RankingReport {
    /// Selected sections, best first
    pub sections: Vec<ScoredSection>,
    pub skipped: Vec<SkippedDocument>,
}

/// Heading detection, segmentation and ranking with fixed settings.
#[derive(Debug)]
pub struct Pipeline {
    detector: HeadingDetector,
    min_section_chars: usize,
    options: RankOptions,
    batch_size: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(HeadingDetector::default())
    }
}

impl Pipeline {
    pub fn new(detector: HeadingDetector) -> Self {
        Self {
            detector,
            min_section_chars: DEFAULT_MIN_SECTION_CHARS,
            options: RankOptions::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Build a pipeline from tunables and an optional fallback classifier.
    pub fn from_settings(
        settings: &Settings,
        classifier: Option<Arc<dyn FallbackClassifier>>,
    ) -> Self {
        let tiers = settings.tiers();
        let mut detector = HeadingDetector::new(tiers.strategy.build(tiers.clusters, tiers.seed))
            .with_tolerance(settings.merge_tolerance())
            .with_body_filter(settings.body_filter());
        if let Some(classifier) = classifier {
            detector = detector.with_classifier(classifier);
        }

        Self {
            detector,
            min_section_chars: settings.min_section_chars(),
            options: settings.ranking(),
            batch_size: settings.embedder().batch_size.max(1),
        }
    }

    pub fn with_rank_options(mut self, options: RankOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn rank_options(&self) -> &RankOptions {
        &self.options
    }

    /// Heading outline of a decoded document.
    pub fn outline(&self, doc: &DecodedDocument) -> Outline {
        Outline::from_headings(&self.detector.detect(doc))
    }

    /// Sections of a decoded document.
    pub fn sections_of(&self, doc: &DecodedDocument) -> Vec<Section> {
        let headings = self.detector.detect(doc);
        segment_sections(&doc.id, &headings, &doc.page_texts(), self.min_section_chars)
    }

    /// Decode and segment one document.
    pub fn extract_document(&self, source: &dyn DocumentSource, path: &Path) -> Result<Vec<Section>> {
        let doc = source.load(path)?;
        let sections = self.sections_of(&doc);
        debug!("{}: {} sections", doc.id, sections.len());
        Ok(sections)
    }

    /// Decode and segment documents in parallel.
    ///
    /// Documents that fail to load are logged and reported in
    /// [`Extraction::skipped`]; they never abort the others.
    pub fn extract_sections(
        &self,
        source: &dyn DocumentSource,
        paths: &[PathBuf],
        progress: Option<&ProgressBar>,
    ) -> Extraction {
        let results: Vec<(&PathBuf, Result<Vec<Section>>)> = paths
            .par_iter()
            .map(|path| {
                let result = self.extract_document(source, path);
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                (path, result)
            })
            .collect();

        let mut extraction = Extraction::default();
        for (path, result) in results {
            match result {
                Ok(sections) => extraction.sections.extend(sections),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    extraction.skipped.push(SkippedDocument {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        extraction
    }

    /// Score `sections` against `query` and select the diverse top-K.
    ///
    /// Sections are embedded in batches. A section whose embedding fails, or
    /// comes back with the wrong dimension or non-finite values, is dropped
    /// with a warning. A failed or malformed query embedding is an error.
    pub fn rank(
        &self,
        embedder: &mut dyn EmbedderBackend,
        query: &Query,
        sections: Vec<Section>,
    ) -> Result<Vec<ScoredSection>> {
        let mut query_vector = embedder.embed_query(query.as_str())?;
        if query_vector.is_empty() {
            return Err(Error::Embedding(format!(
                "{} returned an empty query vector",
                embedder.name()
            )));
        }
        check_vector(&query_vector, query_vector.len())?;
        l2_normalize(&mut query_vector);
        let keywords = query_keywords(query.as_str(), self.options.keyword_min_len);
        debug!("Query keywords: {:?}", keywords);

        let total = sections.len();
        let mut scored = Vec::with_capacity(total);
        let mut remaining = sections.into_iter().peekable();

        while remaining.peek().is_some() {
            let batch: Vec<Section> = remaining.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(Section::embedding_text).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

            let vectors: Vec<Result<Vec<f32>>> = match embedder.embed_batch(&refs) {
                Ok(vectors) if vectors.len() == refs.len() => vectors.into_iter().map(Ok).collect(),
                Ok(vectors) => {
                    warn!(
                        "{} returned {} vectors for {} texts; embedding one at a time",
                        embedder.name(),
                        vectors.len(),
                        refs.len()
                    );
                    refs.iter().map(|text| embedder.embed_document(text)).collect()
                }
                Err(e) => {
                    warn!("Batch embedding failed ({}); embedding one at a time", e);
                    refs.iter().map(|text| embedder.embed_document(text)).collect()
                }
            };

            for (section, vector) in batch.into_iter().zip(vectors) {
                let vector = vector.and_then(|v| check_vector(&v, query_vector.len()).map(|_| v));
                match vector {
                    Ok(mut vector) => {
                        l2_normalize(&mut vector);
                        let similarity = cosine_similarity(&query_vector, &vector);
                        scored.push(score_section(section, similarity, &keywords, &self.options));
                    }
                    Err(e) => warn!(
                        "Dropping section {:?} of {}: {}",
                        section.title, section.document_id, e
                    ),
                }
            }
        }

        info!("Scored {} of {} sections", scored.len(), total);
        Ok(select_diverse(scored, &self.options))
    }

    /// Extract, score and select in one call.
    pub fn run(
        &self,
        source: &dyn DocumentSource,
        embedder: &mut dyn EmbedderBackend,
        query: &Query,
        paths: &[PathBuf],
        progress: Option<&ProgressBar>,
    ) -> Result<RankingReport> {
        let extraction = self.extract_sections(source, paths, progress);
        info!(
            "Extracted {} sections from {} documents ({} skipped)",
            extraction.sections.len(),
            paths.len() - extraction.skipped.len(),
            extraction.skipped.len()
        );
        let sections = self.rank(embedder, query, extraction.sections)?;
        Ok(RankingReport {
            sections,
            skipped: extraction.skipped,
        })
    }
}

/// Vectors must match the query dimension and hold only finite values.
fn check_vector(vector: &[f32], dim: usize) -> Result<()> {
    if vector.len() != dim {
        return Err(Error::Embedding(format!(
            "expected {} dimensions, got {}",
            dim,
            vector.len()
        )));
    }
    if let Some(i) = vector.iter().position(|x| !x.is_finite()) {
        return Err(Error::Embedding(format!(
            "non-finite value {} at index {}",
            vector[i], i
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;
    use crate::span::{BBox, PageText, RawSpan};
    use serde_json::json;
    use std::collections::HashMap;

    /// In-memory documents keyed by path.
    struct MemorySource(HashMap<PathBuf, DecodedDocument>);

    impl DocumentSource for MemorySource {
        fn load(&self, path: &Path) -> Result<DecodedDocument> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| Error::document(path, "not found"))
        }

        fn name(&self) -> &str {
            "memory"
        }
    }

    fn document(id: &str, headings: &[(&str, u32)], pages: &[&str]) -> DecodedDocument {
        let mut spans = Vec::new();
        for (i, (text, page)) in headings.iter().enumerate() {
            spans.push(RawSpan {
                page: *page,
                text: text.to_string(),
                size: 18.0,
                font: "Helvetica-Bold".to_string(),
                bbox: BBox::new(72.0, 40.0 + i as f32, 300.0, 58.0 + i as f32),
            });
            spans.push(RawSpan {
                page: *page,
                text: "Regular paragraph text that continues for a while on the page".to_string(),
                size: 10.0,
                font: "Helvetica".to_string(),
                bbox: BBox::new(72.0, 100.0 + i as f32, 500.0, 110.0 + i as f32),
            });
        }
        DecodedDocument {
            id: id.to_string(),
            pages: pages
                .iter()
                .enumerate()
                .map(|(i, text)| PageText {
                    number: i as u32 + 1,
                    width: 612.0,
                    height: 792.0,
                    text: text.to_string(),
                })
                .collect(),
            spans,
        }
    }

    fn source() -> MemorySource {
        let mut docs = HashMap::new();
        docs.insert(
            PathBuf::from("beaches.pdf"),
            document(
                "beaches.pdf",
                &[("Coastal Adventures", 1), ("Harbor Towns", 2)],
                &[
                    "Coastal adventures: beach hopping, snorkeling and sailing trips for groups.",
                    "Harbor towns with quiet old ports, fishing boats and seafood markets.",
                ],
            ),
        );
        docs.insert(
            PathBuf::from("finance.pdf"),
            document(
                "finance.pdf",
                &[("Quarterly Revenue", 1)],
                &["Quarterly revenue grew in the semiconductor segment this fiscal year."],
            ),
        );
        MemorySource(docs)
    }

    fn query(text: &str) -> Query {
        Query::resolve(&json!(text), &serde_json::Value::Null).unwrap()
    }

    #[test]
    fn test_extract_sections_in_input_order() {
        let paths = vec![PathBuf::from("finance.pdf"), PathBuf::from("beaches.pdf")];
        let extraction = Pipeline::default().extract_sections(&source(), &paths, None);
        let titles: Vec<&str> = extraction.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Quarterly Revenue", "Coastal Adventures", "Harbor Towns"]);
        assert!(extraction.skipped.is_empty());
    }

    #[test]
    fn test_missing_document_is_skipped() {
        let paths = vec![PathBuf::from("missing.pdf"), PathBuf::from("finance.pdf")];
        let progress = ProgressBar::hidden();
        let extraction = Pipeline::default().extract_sections(&source(), &paths, Some(&progress));
        assert_eq!(extraction.sections.len(), 1);
        assert_eq!(extraction.skipped.len(), 1);
        assert_eq!(extraction.skipped[0].path, PathBuf::from("missing.pdf"));
        assert_eq!(progress.position(), 2);
    }

    #[test]
    fn test_rank_prefers_matching_document_and_caps_per_document() {
        let paths = vec![PathBuf::from("beaches.pdf"), PathBuf::from("finance.pdf")];
        let mut embedder = HashingEmbedder::new(1024).unwrap();
        let report = Pipeline::default()
            .run(&source(), &mut embedder, &query("coastal adventures beach snorkeling"), &paths, None)
            .unwrap();
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.sections[0].section.title, "Coastal Adventures");
        assert_eq!(report.sections[1].section.document_id, "finance.pdf");
    }

    #[test]
    fn test_batch_size_does_not_change_ranking() {
        let paths = vec![PathBuf::from("beaches.pdf"), PathBuf::from("finance.pdf")];
        let pipeline = Pipeline::default();
        let sections = pipeline.extract_sections(&source(), &paths, None).sections;
        let q = query("harbor towns seafood");

        let batched = pipeline
            .rank(&mut HashingEmbedder::default(), &q, sections.clone())
            .unwrap();
        let single = Pipeline::default()
            .with_batch_size(1)
            .rank(&mut HashingEmbedder::default(), &q, sections)
            .unwrap();
        assert_eq!(batched, single);
    }

    /// Fails on any text mentioning "revenue".
    struct PickyEmbedder(HashingEmbedder);

    impl EmbedderBackend for PickyEmbedder {
        fn embed_document(&mut self, text: &str) -> Result<Vec<f32>> {
            if text.to_lowercase().contains("revenue") {
                return Err(Error::Embedding("refused".to_string()));
            }
            self.0.embed_document(text)
        }

        fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
            self.0.embed_query(text)
        }

        fn embedding_dim(&self) -> usize {
            self.0.embedding_dim()
        }

        fn name(&self) -> &str {
            "picky"
        }
    }

    #[test]
    fn test_failed_section_embedding_is_excluded() {
        let paths = vec![PathBuf::from("beaches.pdf"), PathBuf::from("finance.pdf")];
        let mut embedder = PickyEmbedder(HashingEmbedder::default());
        let report = Pipeline::default()
            .run(&source(), &mut embedder, &query("anything at all"), &paths, None)
            .unwrap();
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].section.document_id, "beaches.pdf");
    }

    /// Returns a one-dimensional vector for "revenue" texts and NaNs for
    /// "harbor" texts.
    struct MalformedEmbedder(HashingEmbedder);

    impl EmbedderBackend for MalformedEmbedder {
        fn embed_document(&mut self, text: &str) -> Result<Vec<f32>> {
            let lowered = text.to_lowercase();
            if lowered.contains("revenue") {
                return Ok(vec![1.0]);
            }
            if lowered.contains("harbor") {
                return Ok(vec![f32::NAN; self.0.embedding_dim()]);
            }
            self.0.embed_document(text)
        }

        fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
            self.0.embed_query(text)
        }

        fn embedding_dim(&self) -> usize {
            self.0.embedding_dim()
        }

        fn name(&self) -> &str {
            "malformed"
        }
    }

    #[test]
    fn test_malformed_section_vectors_are_excluded() {
        let paths = vec![PathBuf::from("beaches.pdf"), PathBuf::from("finance.pdf")];
        let options = RankOptions {
            per_document_cap: 5,
            ..RankOptions::default()
        };
        let report = Pipeline::default()
            .with_rank_options(options)
            .run(
                &source(),
                &mut MalformedEmbedder(HashingEmbedder::default()),
                &query("harbor towns and quarterly revenue"),
                &paths,
                None,
            )
            .unwrap();

        let titles: Vec<&str> = report
            .sections
            .iter()
            .map(|s| s.section.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Coastal Adventures"]);
        assert!(report.sections[0].score.is_finite());
    }

    #[test]
    fn test_check_vector() {
        assert!(check_vector(&[0.6, 0.8], 2).is_ok());
        assert!(matches!(check_vector(&[1.0], 2), Err(Error::Embedding(_))));
        assert!(check_vector(&[f32::NAN, 0.0], 2).is_err());
        assert!(check_vector(&[f32::INFINITY, 0.0], 2).is_err());
    }

    struct NanQuery;

    impl EmbedderBackend for NanQuery {
        fn embed_document(&mut self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn embed_query(&mut self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![f32::NAN, 0.0])
        }

        fn embedding_dim(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "nan-query"
        }
    }

    #[test]
    fn test_non_finite_query_vector_is_error() {
        let paths = vec![PathBuf::from("beaches.pdf")];
        let result = Pipeline::default().run(&source(), &mut NanQuery, &query("beaches"), &paths, None);
        assert!(matches!(result, Err(Error::Embedding(_))));
    }

    struct NoQuery;

    impl EmbedderBackend for NoQuery {
        fn embed_document(&mut self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }

        fn embed_query(&mut self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::Embedding("model offline".to_string()))
        }

        fn embedding_dim(&self) -> usize {
            1
        }

        fn name(&self) -> &str {
            "no-query"
        }
    }

    #[test]
    fn test_failed_query_embedding_is_error() {
        let result = Pipeline::default().rank(&mut NoQuery, &query("q"), Vec::new());
        assert!(matches!(result, Err(Error::Embedding(_))));
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings::from_toml("[ranking]\ntop_k = 1\n[embedder]\nbatch_size = 4\n").unwrap();
        let pipeline = Pipeline::from_settings(&settings, None);
        assert_eq!(pipeline.rank_options().top_k, 1);
        assert_eq!(pipeline.batch_size, 4);
    }

    #[test]
    fn test_outline() {
        let docs = source();
        let outline = Pipeline::default().outline(&docs.0[Path::new("beaches.pdf")]);
        assert_eq!(outline.title, "Coastal Adventures");
        assert_eq!(outline.outline.len(), 2);
    }
}
