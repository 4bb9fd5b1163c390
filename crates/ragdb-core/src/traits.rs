use crate::types::{Candidate, IndexEntry};

/// Text to unit-length vector. Chunks and queries go through the same path.
pub trait Embedder: Send + Sync {
    /// Stable identity of model + dimension, recorded in built indexes.
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for query"))
    }
}

/// Approximate or exact nearest-neighbour store over [`IndexEntry`] rows.
pub trait VectorIndex: Send + Sync {
    fn count(&self) -> anyhow::Result<usize>;
    /// Append all entries as one unit; either every entry becomes visible or none.
    fn add_batch(&self, entries: Vec<IndexEntry>) -> anyhow::Result<()>;
    /// Like [`VectorIndex::add_batch`], and records `meta` in the same write,
    /// but only while the index is empty. Returns `Some(existing)` without
    /// writing anything when it already holds entries.
    fn add_batch_if_empty(&self, entries: Vec<IndexEntry>, meta: &[(&str, &str)]) -> anyhow::Result<Option<usize>>;
    /// Up to `k` candidates ordered by ascending distance.
    fn query(&self, query_vec: &[f32], k: usize) -> anyhow::Result<Vec<Candidate>>;
    fn get_meta(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set_meta(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Pairwise (query, passage) relevance model. Scores are unbounded and only
/// comparable within one call.
pub trait Reranker: Send + Sync {
    fn score_batch(&self, query: &str, candidates: &[&str]) -> anyhow::Result<Vec<f32>>;

    fn score(&self, query: &str, candidate: &str) -> anyhow::Result<f32> {
        self.score_batch(query, &[candidate])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("reranker returned no score"))
    }
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn embedder_id(&self) -> &str { (**self).embedder_id() }
    fn dim(&self) -> usize { (**self).dim() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { (**self).embed_batch(texts) }
}

impl<T: Reranker + ?Sized> Reranker for Box<T> {
    fn score_batch(&self, query: &str, candidates: &[&str]) -> anyhow::Result<Vec<f32>> {
        (**self).score_batch(query, candidates)
    }
}

impl<T: VectorIndex + ?Sized> VectorIndex for std::sync::Arc<T> {
    fn count(&self) -> anyhow::Result<usize> { (**self).count() }
    fn add_batch(&self, entries: Vec<IndexEntry>) -> anyhow::Result<()> { (**self).add_batch(entries) }
    fn add_batch_if_empty(&self, entries: Vec<IndexEntry>, meta: &[(&str, &str)]) -> anyhow::Result<Option<usize>> {
        (**self).add_batch_if_empty(entries, meta)
    }
    fn query(&self, query_vec: &[f32], k: usize) -> anyhow::Result<Vec<Candidate>> { (**self).query(query_vec, k) }
    fn get_meta(&self, key: &str) -> anyhow::Result<Option<String>> { (**self).get_meta(key) }
    fn set_meta(&self, key: &str, value: &str) -> anyhow::Result<()> { (**self).set_meta(key, value) }
}
