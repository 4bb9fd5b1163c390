//! Text embedding backends.
//!
//! [`SentenceEmbedder`] hosts a BERT-family sentence encoder with candle;
//! [`HashEmbedder`] is a deterministic stand-in for tests and offline work.
//! The model loading helpers here are shared with the reranker crate.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;

use ragdb_core::config::{expand_path, EmbeddingSettings};
use ragdb_core::traits::Embedder;

pub mod device;
pub mod hash;
pub mod pool;
pub mod sentence;
pub mod tokenize;

pub use device::select_device;
pub use hash::HashEmbedder;
pub use pool::{l2_normalize, masked_mean_l2};
pub use sentence::SentenceEmbedder;

pub const DEFAULT_MODEL_DIR: &str = "models/all-MiniLM-L6-v2";

/// Pick the embedder for these settings. `APP_USE_FAKE_EMBEDDINGS=1` (or
/// `embedding.use_fake`) selects the hashing embedder.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    if settings.use_fake || env_flag("APP_USE_FAKE_EMBEDDINGS") {
        tracing::info!("Using HashEmbedder");
        return Ok(Box::new(HashEmbedder::default()));
    }
    let model_dir = resolve_model_dir(settings.model_dir.as_deref(), DEFAULT_MODEL_DIR)?;
    Ok(Box::new(SentenceEmbedder::load(&model_dir, settings.max_len, settings.batch_size)?))
}

pub fn env_flag(name: &str) -> bool {
    std::env::var(name).ok().is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// First existing directory among the configured one, `APP_MODEL_DIR`,
/// `MODEL_DIR` and `fallback`.
pub fn resolve_model_dir(configured: Option<&str>, fallback: &str) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() {
            tracing::info!(path = %p.display(), "Using configured model dir");
            return Ok(p);
        }
        return Err(anyhow!("Configured model directory {} does not exist", p.display()));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = expand_path(&dir);
            if p.exists() {
                tracing::info!(path = %p.display(), source = var, "Using model dir");
                return Ok(p);
            }
        }
    }
    let p = Path::new(fallback);
    if p.exists() {
        tracing::info!(path = %p.display(), "Using model dir");
        return Ok(p.to_path_buf());
    }
    Err(anyhow!("Could not locate model directory (tried settings, APP_MODEL_DIR, MODEL_DIR, {fallback})"))
}

/// Weights from `model.safetensors`, falling back to `pytorch_model.bin`.
pub fn load_var_builder(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    let tensors: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else {
        let pth = model_dir.join("pytorch_model.bin");
        if !pth.exists() {
            return Err(anyhow!("No model.safetensors or pytorch_model.bin in {}", model_dir.display()));
        }
        candle_core::pickle::read_all(&pth)?.into_iter().collect()
    };
    Ok(VarBuilder::from_tensors(tensors, candle_transformers::models::bert::DTYPE, device))
}

pub fn read_json(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&raw)?)
}
