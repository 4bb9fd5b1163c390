use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Pipeline stage that produced a retrieval failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embed,
    Search,
    Rerank,
    Worker,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Embed => "embed",
            Stage::Search => "search",
            Stage::Rerank => "rerank",
            Stage::Worker => "worker",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("Index error: {0}")]
    Index(String),

    #[error("Index was built with embedder '{index}' but '{embedder}' is in use; rebuild the collection")]
    EmbedderMismatch { index: String, embedder: String },

    #[error("Retrieval failed during {stage} stage: {source}")]
    Retrieval {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("Retrieval timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn retrieval(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        Error::Retrieval { stage, source: source.into() }
    }

    /// The failing stage when this is a retrieval error.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Retrieval { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
