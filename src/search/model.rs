use crate::core::error::{Error, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::api::sync::Api;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::info;

/// Turns text into fixed-length, L2-normalized vectors.
///
/// Implementations must be deterministic for identical input within one process.
pub trait Embedder: Send + Sync {
    /// Identifier stored alongside snapshots; a change forces a rebuild
    fn model_id(&self) -> &str;

    /// Length of every vector produced
    fn dimension(&self) -> usize;

    /// Embed one text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, in order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Fields of the model's `config.json` needed before loading weights
#[derive(Debug, Deserialize)]
struct ModelShape {
    hidden_size: usize,
    #[serde(default = "default_max_positions")]
    max_position_embeddings: usize,
}

fn default_max_positions() -> usize {
    512
}

/// Files of a model snapshot on local disk
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

/// BERT sentence encoder: mean pooling over tokens, then L2 normalization
pub struct BertEmbedder {
    model_id: String,
    model: Mutex<BertModel>,
    tokenizer: Mutex<Tokenizer>,
    device: Device,
    dimension: usize,
}

impl BertEmbedder {
    /// Load a model from the HuggingFace Hub (cached locally after the first download)
    pub fn from_hub(model_id: &str) -> Result<Self> {
        info!("Loading embedding model {}", model_id);

        let api = Api::new()?;
        let repo = api.model(model_id.to_string());
        let files = ModelFiles {
            config: repo.get("config.json")?,
            tokenizer: repo.get("tokenizer.json")?,
            weights: repo.get("model.safetensors")?,
        };

        Self::load(model_id, &files)
    }

    /// Load a model from a local directory holding `config.json`,
    /// `tokenizer.json` and `model.safetensors`
    pub fn from_dir(model_id: &str, dir: &Path) -> Result<Self> {
        let files = ModelFiles {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        };
        for path in [&files.config, &files.tokenizer, &files.weights] {
            if !path.exists() {
                return Err(Error::Model(format!(
                    "Model file not found: {}",
                    path.display()
                )));
            }
        }

        Self::load(model_id, &files)
    }

    fn load(model_id: &str, files: &ModelFiles) -> Result<Self> {
        let config_content = std::fs::read_to_string(&files.config)?;
        let shape: ModelShape = serde_json::from_str(&config_content)
            .map_err(|e| Error::Model(format!("Failed to parse config: {}", e)))?;
        let bert_config: BertConfig = serde_json::from_str(&config_content)
            .map_err(|e| Error::Model(format!("Failed to parse config: {}", e)))?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| Error::Tokenizer(format!("Failed to load tokenizer: {}", e)))?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: shape.max_position_embeddings,
                ..Default::default()
            }))
            .map_err(|e| Error::Tokenizer(format!("Failed to configure truncation: {}", e)))?;

        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);

        // Load model weights using memory mapping
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DTYPE, &device)
                .map_err(|e| Error::Model(format!("Failed to load weights: {}", e)))?
        };
        let model = BertModel::load(vb, &bert_config)
            .map_err(|e| Error::Model(format!("Failed to load model: {}", e)))?;

        info!("Model loaded ({} dimensions)", shape.hidden_size);

        Ok(Self {
            model_id: model_id.to_string(),
            model: Mutex::new(model),
            tokenizer: Mutex::new(tokenizer),
            device,
            dimension: shape.hidden_size,
        })
    }

    /// L2 normalization
    fn normalize_l2(v: &Tensor) -> Result<Tensor> {
        Ok(v.broadcast_div(&v.sqr()?.sum_keepdim(1)?.sqrt()?)?)
    }
}

impl Embedder for BertEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .lock()
            .map_err(|e| Error::Lock(format!("Failed to lock tokenizer: {}", e)))?
            .encode(text, true)
            .map_err(|e| Error::Tokenizer(format!("Tokenization failed: {}", e)))?;

        let token_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = token_ids.zeros_like()?;

        let model = self
            .model
            .lock()
            .map_err(|e| Error::Lock(format!("Failed to lock model: {}", e)))?;
        // [1, seq, hidden]
        let hidden = model.forward(&token_ids, &token_type_ids)?;
        drop(model);

        let (_, seq_len, _) = hidden.dims3()?;
        let pooled = (hidden.sum(1)? / seq_len.max(1) as f64)?;
        let normalized = Self::normalize_l2(&pooled)?;

        Ok(normalized.squeeze(0)?.to_vec1::<f32>()?)
    }
}
