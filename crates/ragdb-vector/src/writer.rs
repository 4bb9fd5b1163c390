//! Build-or-skip population of a [`VectorIndex`] from chunks.

use indicatif::{ProgressBar, ProgressStyle};

use ragdb_core::traits::{Embedder, VectorIndex};
use ragdb_core::types::{Chunk, IndexEntry};
use ragdb_core::{Error, Result};

use crate::content_hash;

pub const EMBEDDER_ID_KEY: &str = "embedder_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { entries: usize },
    /// The index already held entries; nothing was written.
    Skipped { existing: usize },
}

pub struct IndexWriter<'a, I: VectorIndex + ?Sized> {
    index: &'a I,
    embedder: &'a dyn Embedder,
    batch_size: usize,
    show_progress: bool,
}

impl<'a, I: VectorIndex + ?Sized> IndexWriter<'a, I> {
    pub fn new(index: &'a I, embedder: &'a dyn Embedder) -> Self {
        Self { index, embedder, batch_size: 32, show_progress: false }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Embed and store `chunks` unless the index is already populated. The
    /// emptiness check is repeated inside the final write, so concurrent
    /// builds commit at most once.
    pub fn build(&self, chunks: &[Chunk]) -> Result<BuildOutcome> {
        let existing = self.index.count().map_err(index_err)?;
        if existing > 0 {
            tracing::warn!(existing, "Index already populated, skipping build");
            return Ok(BuildOutcome::Skipped { existing });
        }
        if chunks.is_empty() {
            tracing::info!("No chunks to index");
            return Ok(BuildOutcome::Built { entries: 0 });
        }

        tracing::info!(chunks = chunks.len(), embedder = self.embedder.embedder_id(), "Building index");
        let vectors = self.embed_all(chunks)?;
        let dim = self.embedder.dim();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::Index(format!("embedder returned dimension {}, expected {dim}", bad.len())));
        }

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let mut metadata = chunk.to_meta();
                metadata.insert("content_hash".into(), content_hash(&chunk.content));
                IndexEntry { id: chunk.chunk_id.clone(), vector, text: chunk.content.clone(), metadata }
            })
            .collect();
        let count = entries.len();

        let meta = [(EMBEDDER_ID_KEY, self.embedder.embedder_id())];
        if let Some(existing) = self.index.add_batch_if_empty(entries, &meta).map_err(index_err)? {
            tracing::warn!(existing, "Index populated by a concurrent build, skipping");
            return Ok(BuildOutcome::Skipped { existing });
        }
        tracing::info!(entries = count, "Index built");
        Ok(BuildOutcome::Built { entries: count })
    }

    fn embed_all(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let pb = if self.show_progress { ProgressBar::new(chunks.len() as u64) } else { ProgressBar::hidden() };
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = self
                .embedder
                .embed_batch(&texts)
                .map_err(|e| Error::Index(format!("embedding failed: {e:#}")))?;
            if embedded.len() != texts.len() {
                return Err(Error::Index(format!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
            pb.inc(batch.len() as u64);
        }
        pb.finish_with_message("embedded");
        Ok(vectors)
    }
}

/// Reject an index built with a different embedder than `embedder`.
pub fn check_embedder<I: VectorIndex + ?Sized>(index: &I, embedder: &dyn Embedder) -> Result<()> {
    match index.get_meta(EMBEDDER_ID_KEY).map_err(index_err)? {
        Some(id) if id != embedder.embedder_id() => {
            Err(Error::EmbedderMismatch { index: id, embedder: embedder.embedder_id().to_string() })
        }
        Some(_) => Ok(()),
        None => {
            if index.count().map_err(index_err)? > 0 {
                tracing::warn!("Index has no recorded embedder id");
            }
            Ok(())
        }
    }
}

fn index_err(e: anyhow::Error) -> Error {
    Error::Index(format!("{e:#}"))
}
