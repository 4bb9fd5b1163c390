use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Instant;

use candle_core::{Device, IndexOp};
use candle_nn::{linear, Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use ragdb_core::traits::Reranker;
use ragdb_embed::tokenize::{encode_batch_on_device, load_tokenizer};
use ragdb_embed::{load_var_builder, read_json, select_device};

/// BERT sequence-classification cross-encoder (ms-marco MiniLM style).
/// The score of a pair is the first logit.
pub struct CrossEncoderReranker {
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
    batch_size: usize,
}

impl CrossEncoderReranker {
    pub fn load(model_dir: &Path, max_len: usize, batch_size: usize) -> Result<Self> {
        let device = select_device();
        tracing::info!(model_dir = %model_dir.display(), "Loading cross-encoder");

        let tokenizer = load_tokenizer(&model_dir.join("tokenizer.json"), max_len)?;
        let raw_config = read_json(&model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_value(raw_config.clone())?;
        let num_labels = raw_config
            .get("id2label")
            .and_then(serde_json::Value::as_object)
            .map_or(1, |m| m.len().max(1));

        let vb = load_var_builder(model_dir, &device)?;
        let model = BertModel::load(vb.clone(), &config)?;
        let pooler = load_linear(&vb, &["bert.pooler.dense", "pooler.dense"], config.hidden_size, config.hidden_size)?;
        let classifier = load_linear(&vb, &["classifier"], config.hidden_size, num_labels)?;

        tracing::info!(num_labels, max_len, "Cross-encoder ready");
        Ok(Self { model, pooler, classifier, tokenizer, device, batch_size: batch_size.max(1) })
    }

    fn score_chunk(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let pairs: Vec<(&str, &str)> = passages.iter().map(|p| (query, *p)).collect();
        let batch = encode_batch_on_device(&self.tokenizer, pairs, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;
        let scores = logits.i((.., 0))?.to_device(&Device::Cpu)?.to_vec1::<f32>()?;
        Ok(scores)
    }
}

fn load_linear(vb: &VarBuilder, prefixes: &[&str], in_dim: usize, out_dim: usize) -> Result<Linear> {
    let mut last_err = None;
    for prefix in prefixes {
        match linear(in_dim, out_dim, vb.pp(*prefix)) {
            Ok(layer) => return Ok(layer),
            Err(e) => last_err = Some(e),
        }
    }
    Err(anyhow!("Missing weights for {:?}: {:?}", prefixes, last_err))
}

impl Reranker for CrossEncoderReranker {
    fn score_batch(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
        let start = Instant::now();
        let mut scores = Vec::with_capacity(candidates.len());
        for chunk in candidates.chunks(self.batch_size) {
            scores.extend(self.score_chunk(query, chunk)?);
        }
        tracing::debug!(pairs = candidates.len(), elapsed_ms = start.elapsed().as_millis() as u64, "Scored pairs");
        Ok(scores)
    }
}
