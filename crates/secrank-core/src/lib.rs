//! secrank-core: persona-driven section ranking over paginated documents
//!
//! This crate provides:
//! - Span normalization and font-size tiering (k-means or sorted gaps)
//! - Heading assembly with noise/body filtering and a fallback classifier
//! - Page-granular section segmentation
//! - Embedding-based relevance scoring with a per-document diversity cap

pub mod assembler;
pub mod classifier;
pub mod config;
pub mod embedder;
pub mod error;
pub mod filters;
pub mod output;
pub mod pipeline;
pub mod ranking;
pub mod segmenter;
pub mod source;
pub mod span;
pub mod tiering;

#[cfg(feature = "candle")]
pub mod embedder_bert;

#[cfg(feature = "pdf")]
pub mod pdf;

// Re-exports
pub use assembler::{Heading, HeadingDetector, HeadingSource, MergeTolerance, Outline};
pub use classifier::{FallbackClassifier, FeatureVector, Label, TreeEnsemble};
pub use config::{default_config_path, load_settings, InputConfig, Query, Settings};
pub use embedder::{
    cosine_similarity, l2_normalize, load_embedder, EmbedderBackend, EmbedderKind,
    EmbedderOptions, HashingEmbedder,
};
pub use error::{Error, Result};
pub use filters::BodyFilter;
pub use output::ChallengeOutput;
pub use pipeline::{Extraction, Pipeline, RankingReport, SkippedDocument};
pub use ranking::{RankOptions, ScoredSection};
pub use segmenter::Section;
pub use source::{DocumentSource, FileSource, SpanDumpSource};
pub use span::{BBox, DecodedDocument, PageText, RawSpan};
pub use tiering::{GapTiers, HeadingLevel, KMeansTiers, TierStrategy, TierStrategyKind};

#[cfg(feature = "candle")]
pub use embedder_bert::BertEmbedder;

#[cfg(feature = "pdf")]
pub use pdf::PdfiumSource;
