//! BERT sentence embeddings with candle
//!
//! Loads a BERT-family sentence-embedding model (`intfloat/e5-small-v2` by
//! default) from the HuggingFace hub and produces one mean-pooled,
//! L2-normalized vector per text. E5 models expect `query: ` / `passage: `
//! prefixes, which are added automatically for model ids containing `e5`.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::ApiBuilder;
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{info, warn};

use crate::embedder::EmbedderBackend;
use crate::error::{Error, Result};

/// Maximum sequence length fed to the model
const MAX_SEQ_LEN: usize = 512;

fn embedding_error(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Embedding(format!("{context}: {e}"))
}

/// Sentence embedder backed by a candle `BertModel`.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    model_id: String,
    query_prefix: &'static str,
    passage_prefix: &'static str,
}

impl BertEmbedder {
    /// Load `model_id`, trying `fallback` when it cannot be loaded.
    pub fn from_pretrained_with_fallback(model_id: &str, fallback: Option<&str>) -> Result<Self> {
        match Self::from_pretrained(model_id, &Device::Cpu) {
            Ok(embedder) => Ok(embedder),
            Err(e) => match fallback {
                Some(fallback) => {
                    warn!("Failed to load {}: {}; falling back to {}", model_id, e, fallback);
                    Self::from_pretrained(fallback, &Device::Cpu)
                }
                None => Err(e),
            },
        }
    }

    /// Download (or reuse from the hub cache) and load a model.
    pub fn from_pretrained(model_id: &str, device: &Device) -> Result<Self> {
        let api = ApiBuilder::new()
            .with_progress(false)
            .build()
            .map_err(|e| embedding_error("Failed to create HuggingFace API", e))?;
        let repo = api.model(model_id.to_string());

        info!("Loading embedding model {}", model_id);
        let config_path = repo
            .get("config.json")
            .map_err(|e| embedding_error("Failed to get config.json", e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| embedding_error("Failed to get tokenizer.json", e))?;
        let weights_path = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))
            .map_err(|e| embedding_error("Failed to get model weights", e))?;

        let mut embedder = Self::from_files(&config_path, &tokenizer_path, &weights_path, device)?;
        embedder.model_id = model_id.to_string();
        if model_id.contains("e5") {
            embedder.query_prefix = "query: ";
            embedder.passage_prefix = "passage: ";
        }
        Ok(embedder)
    }

    /// Load from local files.
    pub fn from_files(
        config_path: &Path,
        tokenizer_path: &Path,
        weights_path: &Path,
        device: &Device,
    ) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| embedding_error("Failed to load tokenizer", e))?;

        let config_str = std::fs::read_to_string(config_path)?;
        let config: BertConfig = serde_json::from_str(&config_str)?;
        let dim = serde_json::from_str::<serde_json::Value>(&config_str)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| Error::Embedding("config.json has no hidden_size".to_string()))?
            as usize;

        let vb = if weights_path.extension().is_some_and(|e| e == "safetensors") {
            // SAFETY: the weights file is not modified while mapped
            unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)
                    .map_err(|e| embedding_error("Failed to load safetensors weights", e))?
            }
        } else {
            VarBuilder::from_pth(weights_path, DType::F32, device)
                .map_err(|e| embedding_error("Failed to load pytorch weights", e))?
        };

        let model = BertModel::load(vb.pp("bert"), &config)
            .or_else(|_| BertModel::load(vb, &config))
            .map_err(|e| embedding_error("Failed to load BERT model", e))?;

        Ok(Self {
            model,
            tokenizer,
            device: device.clone(),
            dim,
            model_id: config_path.display().to_string(),
            query_prefix: "",
            passage_prefix: "",
        })
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| embedding_error("Tokenization failed", e))?;
        let mut tokens = encoding.get_ids().to_vec();
        tokens.truncate(MAX_SEQ_LEN);
        Ok(tokens)
    }

    /// Mean-pooled, L2-normalized embedding.
    fn embed(&self, text: &str) -> candle_core::Result<Vec<f32>> {
        let tokens = self
            .tokenize(text)
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
        let seq_len = tokens.len();

        let input_ids = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::zeros((1, seq_len), DType::U32, &self.device)?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, None)?;

        // [1, seq_len, dim] -> [dim]
        let pooled = hidden.squeeze(0)?.mean(0)?;
        let norm = pooled.sqr()?.sum_all()?.sqrt()?.to_scalar::<f32>()?.max(1e-12);
        (pooled / f64::from(norm))?.to_vec1::<f32>()
    }
}

impl EmbedderBackend for BertEmbedder {
    fn embed_document(&mut self, text: &str) -> Result<Vec<f32>> {
        let input = format!("{}{}", self.passage_prefix, text);
        self.embed(&input)
            .map_err(|e| embedding_error("Embedding forward pass failed", e))
    }

    fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
        let input = format!("{}{}", self.query_prefix, text);
        self.embed(&input)
            .map_err(|e| embedding_error("Embedding forward pass failed", e))
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        &self.model_id
    }
}
