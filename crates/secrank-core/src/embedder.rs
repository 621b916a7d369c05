//! Embedding backends
//!
//! Sections and queries are embedded into single L2-normalized vectors and
//! compared by dot product. Two backends are provided:
//!
//! - [`HashingEmbedder`]: deterministic feature hashing over word unigrams
//!   and bigrams. No model files, always available.
//! - `BertEmbedder` (feature `candle`): a sentence-embedding BERT model
//!   (`intfloat/e5-small-v2` by default) run with candle.
//!
//! Backend selection follows `SECRANK_EMBEDDER` unless overridden.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Environment variable for selecting the embedder backend
pub const EMBEDDER_BACKEND_ENV: &str = "SECRANK_EMBEDDER";

/// Default dimension of the hashing embedder
pub const DEFAULT_HASHING_DIM: usize = 384;

/// Default sentence-embedding model
pub const DEFAULT_MODEL: &str = "intfloat/e5-small-v2";

/// Model tried when the default cannot be loaded
pub const FALLBACK_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Default number of sections per embedding batch
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Trait for embedding backends
///
/// Implementations return one vector per text, L2-normalized, so that
/// [`cosine_similarity`] is a plain dot product.
pub trait EmbedderBackend {
    /// Embed a passage (a section's title and content).
    fn embed_document(&mut self, text: &str) -> Result<Vec<f32>>;

    /// Embed a query.
    fn embed_query(&mut self, text: &str) -> Result<Vec<f32>>;

    /// Embed several passages.
    ///
    /// Default implementation calls embed_document in a loop.
    /// Override for backends with native batch support.
    fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed_document(text)).collect()
    }

    /// Dimension of the produced vectors
    fn embedding_dim(&self) -> usize;

    /// Run a dummy inference so lazy resources are initialized before
    /// timing-sensitive work starts.
    fn warmup(&mut self) -> Result<()> {
        let _ = self.embed_document("warmup")?;
        Ok(())
    }

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Available embedder backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Feature hashing, no model files
    #[default]
    Hashing,
    /// BERT sentence embeddings via candle (feature `candle`)
    Bert,
}

impl std::str::FromStr for EmbedderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashing" | "hash" => Ok(Self::Hashing),
            "bert" | "candle" | "e5" => Ok(Self::Bert),
            _ => Err(format!("Unknown embedder '{s}'. Expected: hashing, bert")),
        }
    }
}

impl std::fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EmbedderKind {
    /// Read the backend from `SECRANK_EMBEDDER`, `None` when unset.
    pub fn from_env() -> Result<Option<Self>> {
        match env::var(EMBEDDER_BACKEND_ENV) {
            Ok(value) => value.parse().map(Some).map_err(Error::Config),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(Error::Config(format!(
                "Failed to read {EMBEDDER_BACKEND_ENV}: {e}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hashing => "hashing",
            Self::Bert => "bert",
        }
    }
}

/// Embedder configuration (`[embedder]` in the settings file)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderOptions {
    pub kind: EmbedderKind,
    /// HuggingFace model id for the BERT backend
    pub model: String,
    /// Model id tried when `model` fails to load
    pub fallback_model: Option<String>,
    /// Vector dimension of the hashing backend
    pub dimension: usize,
    /// Sections per `embed_batch` call
    pub batch_size: usize,
}

impl Default for EmbedderOptions {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::default(),
            model: DEFAULT_MODEL.to_string(),
            fallback_model: Some(FALLBACK_MODEL.to_string()),
            dimension: DEFAULT_HASHING_DIM,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Build the configured embedder.
pub fn load_embedder(options: &EmbedderOptions) -> Result<Box<dyn EmbedderBackend>> {
    match options.kind {
        EmbedderKind::Hashing => Ok(Box::new(HashingEmbedder::new(options.dimension)?)),
        #[cfg(feature = "candle")]
        EmbedderKind::Bert => {
            let embedder = crate::embedder_bert::BertEmbedder::from_pretrained_with_fallback(
                &options.model,
                options.fallback_model.as_deref(),
            )?;
            Ok(Box::new(embedder))
        }
        #[cfg(not(feature = "candle"))]
        EmbedderKind::Bert => Err(Error::Embedding(
            "bert embedder requires building with the `candle` feature".to_string(),
        )),
    }
}

/// Deterministic feature-hashing embedder.
///
/// Every lowercase alphanumeric word and every adjacent word pair is hashed
/// (xxh3) into one of `dim` buckets with a hash-derived sign. Texts sharing
/// vocabulary end up with positive similarity.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

const UNIGRAM_SEED: u64 = 0x5ec7_a41c;
const BIGRAM_SEED: u64 = 0xb16a_3a11;

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dim: DEFAULT_HASHING_DIM,
        }
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::Config(
                "hashing embedder dimension must be positive".to_string(),
            ));
        }
        Ok(Self { dim })
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut vector = vec![0.0f32; self.dim];
        for word in &words {
            self.accumulate(&mut vector, word.as_bytes(), UNIGRAM_SEED, 1.0);
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, bigram.as_bytes(), BIGRAM_SEED, 0.5);
        }

        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], token: &[u8], seed: u64, weight: f32) {
        let hash = xxh3_64_with_seed(token, seed);
        let bucket = (hash % self.dim as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl EmbedderBackend for HashingEmbedder {
    fn embed_document(&mut self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }

    fn warmup(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// L2-normalize a vector in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two L2-normalized vectors (their dot product).
///
/// Mismatched or empty vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_similarity_mismatched() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 4]);
    }

    #[test]
    fn test_hashing_embedder_normalized_and_deterministic() {
        let mut embedder = HashingEmbedder::default();
        let a = embedder.embed_document("Plan a trip for college friends").unwrap();
        let b = embedder.embed_document("Plan a trip for college friends").unwrap();
        assert_eq!(a.len(), DEFAULT_HASHING_DIM);
        assert_eq!(a, b);
        assert!((norm(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_shared_vocabulary_scores_higher() {
        let mut embedder = HashingEmbedder::new(1024).unwrap();
        let query = embedder.embed_query("coastal adventures and beach activities").unwrap();
        let related = embedder
            .embed_document("Coastal Adventures: beach activities along the Mediterranean")
            .unwrap();
        let unrelated = embedder
            .embed_document("Quarterly revenue grew in the semiconductor segment")
            .unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_hashing_embedder_empty_text() {
        let mut embedder = HashingEmbedder::new(8).unwrap();
        assert_eq!(embedder.embed_document("  ").unwrap(), vec![0.0; 8]);
    }

    #[test]
    fn test_batch_matches_single() {
        let mut embedder = HashingEmbedder::default();
        let texts = ["first section text", "second section text"];
        let batch = embedder.embed_batch(&texts).unwrap();
        for (text, vector) in texts.iter().zip(batch) {
            assert_eq!(embedder.embed_document(text).unwrap(), vector);
        }
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[test]
    fn test_embedder_kind_parse() {
        assert_eq!("hashing".parse::<EmbedderKind>(), Ok(EmbedderKind::Hashing));
        assert_eq!("BERT".parse::<EmbedderKind>(), Ok(EmbedderKind::Bert));
        assert!("xtr".parse::<EmbedderKind>().is_err());
        assert_eq!(EmbedderKind::Bert.to_string(), "bert");
    }

    #[test]
    fn test_load_hashing_embedder() {
        let options = EmbedderOptions {
            dimension: 64,
            ..EmbedderOptions::default()
        };
        let embedder = load_embedder(&options).unwrap();
        assert_eq!(embedder.name(), "hashing");
        assert_eq!(embedder.embedding_dim(), 64);
    }

    #[cfg(not(feature = "candle"))]
    #[test]
    fn test_bert_requires_feature() {
        let options = EmbedderOptions {
            kind: EmbedderKind::Bert,
            ..EmbedderOptions::default()
        };
        assert!(matches!(load_embedder(&options), Err(Error::Embedding(_))));
    }
}
