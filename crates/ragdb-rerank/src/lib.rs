//! Pairwise (query, passage) rerankers.

use anyhow::Result;

use ragdb_core::config::RerankSettings;
use ragdb_core::traits::Reranker;
use ragdb_embed::{env_flag, resolve_model_dir};

pub mod cross_encoder;
pub mod lexical;

pub use cross_encoder::CrossEncoderReranker;
pub use lexical::LexicalReranker;

pub const DEFAULT_RERANK_MODEL_DIR: &str = "models/ms-marco-MiniLM-L-6-v2";

/// Pick the reranker for these settings. `APP_USE_FAKE_RERANKER=1` (or
/// `rerank.use_fake`) selects the lexical scorer. `APP_RERANK_MODEL_DIR`
/// overrides the default checkpoint location.
pub fn get_default_reranker(settings: &RerankSettings) -> Result<Box<dyn Reranker>> {
    if settings.use_fake || env_flag("APP_USE_FAKE_RERANKER") {
        tracing::info!("Using LexicalReranker");
        return Ok(Box::new(LexicalReranker));
    }
    let configured = settings.model_dir.clone().or_else(|| std::env::var("APP_RERANK_MODEL_DIR").ok());
    let model_dir = resolve_model_dir(configured.as_deref(), DEFAULT_RERANK_MODEL_DIR)?;
    Ok(Box::new(CrossEncoderReranker::load(&model_dir, settings.max_len, settings.batch_size)?))
}
