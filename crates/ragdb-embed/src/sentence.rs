use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Instant;

use candle_core::Device;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use ragdb_core::traits::Embedder;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::{encode_batch_on_device, load_tokenizer};
use crate::load_var_builder;

/// BERT sentence encoder with masked mean pooling (all-MiniLM / bge style
/// checkpoints). Expects `tokenizer.json`, `config.json` and weights in one
/// directory.
pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    batch_size: usize,
    id: String,
}

impl SentenceEmbedder {
    pub fn load(model_dir: &Path, max_len: usize, batch_size: usize) -> Result<Self> {
        let device = select_device();
        tracing::info!(model_dir = %model_dir.display(), "Loading sentence encoder");

        let tokenizer = load_tokenizer(&model_dir.join("tokenizer.json"), max_len)?;
        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow!("Failed to read {}: {}", config_path.display(), e))?;
        let config: BertConfig = serde_json::from_str(&raw)?;
        let vb = load_var_builder(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;

        let name = model_dir.file_name().map_or_else(|| "model".to_string(), |n| n.to_string_lossy().to_string());
        let dim = config.hidden_size;
        tracing::info!(dim, max_len, "Sentence encoder ready");
        Ok(Self {
            model,
            tokenizer,
            device,
            dim,
            batch_size: batch_size.max(1),
            id: format!("bert:{name}:{dim}"),
        })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let batch = encode_batch_on_device(&self.tokenizer, inputs, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        Ok(pooled.to_device(&Device::Cpu)?.to_vec2::<f32>()?)
    }
}

impl Embedder for SentenceEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.embed_chunk(chunk)?);
        }
        tracing::debug!(texts = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "Embedded batch");
        Ok(out)
    }
}
