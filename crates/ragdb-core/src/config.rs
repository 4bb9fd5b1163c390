//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! on top of built-in defaults. Nested keys use `__` in environment variables,
//! e.g. `APP_RETRIEVAL__FINAL_K=3`. Configured paths expand `~` and `${VAR}`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            other => tracing::debug!(env = other, "no environment overlay for RUST_ENV"),
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    /// Typed view over the merged configuration.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub rerank: RerankSettings,
    pub retrieval: RetrievalSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub corpus_dir: String,
    pub persist_dir: String,
    pub collection: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            corpus_dir: "data".to_string(),
            persist_dir: "ragdb_store".to_string(),
            collection: "policy_docs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: Option<String>,
    pub max_len: usize,
    pub batch_size: usize,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, max_len: 256, batch_size: 32, use_fake: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub model_dir: Option<String>,
    pub max_len: usize,
    pub batch_size: usize,
    pub use_fake: bool,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self { model_dir: None, max_len: 512, batch_size: 16, use_fake: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub retrieve_k: usize,
    pub final_k: usize,
    pub timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { retrieve_k: 20, final_k: 5, timeout_ms: 30_000 }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be > 0".into()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        let r = &self.retrieval;
        if r.final_k > r.retrieve_k {
            return Err(Error::InvalidConfig(format!(
                "retrieval.final_k ({}) must not exceed retrieve_k ({})",
                r.final_k, r.retrieve_k
            )));
        }
        if self.embedding.batch_size == 0 || self.rerank.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".into()));
        }
        if !is_valid_collection(&self.data.collection) {
            return Err(Error::InvalidConfig(format!(
                "data.collection '{}' may only contain letters, digits, '_' and '-'",
                self.data.collection
            )));
        }
        Ok(())
    }

    pub fn corpus_dir(&self) -> PathBuf { expand_path(&self.data.corpus_dir) }

    pub fn persist_dir(&self) -> PathBuf { expand_path(&self.data.persist_dir) }
}

pub fn is_valid_collection(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
