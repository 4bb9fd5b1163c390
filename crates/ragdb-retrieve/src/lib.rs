//! Two-stage retrieval: dense candidate search over a [`VectorIndex`]
//! followed by pairwise reranking of every candidate against the query.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;

use ragdb_core::traits::{Embedder, Reranker, VectorIndex};
use ragdb_core::types::{Candidate, RetrievalResult};
use ragdb_core::{Error, Result, Stage};
use ragdb_vector::check_embedder;

pub mod context;

pub use context::{build_context, render_prompt, PromptTemplate, NOT_AVAILABLE};

pub struct Retriever<I: VectorIndex> {
    index: I,
    embedder: Box<dyn Embedder>,
    reranker: Box<dyn Reranker>,
}

impl<I: VectorIndex> Retriever<I> {
    /// Fails with [`Error::EmbedderMismatch`] when `index` was built by a
    /// different embedder.
    pub fn new(index: I, embedder: Box<dyn Embedder>, reranker: Box<dyn Reranker>) -> Result<Self> {
        check_embedder(&index, embedder.as_ref())?;
        Ok(Self { index, embedder, reranker })
    }

    pub fn index(&self) -> &I { &self.index }

    pub fn embedder(&self) -> &dyn Embedder { self.embedder.as_ref() }

    /// Up to `final_k` results ordered by descending rerank score. A
    /// `final_k` above `retrieve_k` is clamped; an empty index, or a zero
    /// `k`, yields no results.
    pub fn retrieve(&self, query: &str, retrieve_k: usize, final_k: usize) -> Result<Vec<RetrievalResult>> {
        let start = Instant::now();
        let final_k = final_k.min(retrieve_k);
        if final_k == 0 {
            return Ok(Vec::new());
        }
        let count = self.index.count().map_err(|e| Error::retrieval(Stage::Search, e))?;
        if count == 0 {
            tracing::debug!("Index is empty");
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_query(query).map_err(|e| Error::retrieval(Stage::Embed, e))?;
        let candidates = self
            .index
            .query(&query_vec, retrieve_k.min(count))
            .map_err(|e| Error::retrieval(Stage::Search, e))?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let scores = self.reranker.score_batch(query, &texts).map_err(|e| Error::retrieval(Stage::Rerank, e))?;
        if scores.len() != candidates.len() {
            return Err(Error::retrieval(
                Stage::Rerank,
                anyhow!("reranker returned {} scores for {} candidates", scores.len(), candidates.len()),
            ));
        }

        let reranked = candidates.len();
        let results = rank(candidates, scores, final_k);
        tracing::info!(
            query_len = query.chars().count(),
            candidates = reranked,
            returned = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Retrieved"
        );
        Ok(results)
    }

    /// Dense-only search: stage-1 candidates without reranking.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_query(query).map_err(|e| Error::retrieval(Stage::Embed, e))?;
        self.index.query(&query_vec, k).map_err(|e| Error::retrieval(Stage::Search, e))
    }
}

impl<I: VectorIndex + 'static> Retriever<I> {
    /// Run [`Retriever::retrieve`] on the blocking pool with a deadline over
    /// the whole unit. On expiry no partial result is returned.
    pub async fn retrieve_with_timeout(
        self: Arc<Self>,
        query: String,
        retrieve_k: usize,
        final_k: usize,
        timeout: Duration,
    ) -> Result<Vec<RetrievalResult>> {
        let task = tokio::task::spawn_blocking(move || self.retrieve(&query, retrieve_k, final_k));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(Error::retrieval(Stage::Worker, join_err)),
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Retrieval timed out");
                Err(Error::Timeout(timeout))
            }
        }
    }
}

/// Order candidates by descending score (NaN last, ties keep candidate
/// order) and keep the first `final_k`.
pub fn rank(candidates: Vec<Candidate>, scores: Vec<f32>, final_k: usize) -> Vec<RetrievalResult> {
    let mut scored: Vec<(Candidate, f32)> = candidates.into_iter().zip(scores).collect();
    scored.sort_by(|a, b| by_score_desc(a.1, b.1));
    scored
        .into_iter()
        .take(final_k)
        .map(|(c, rerank_score)| RetrievalResult { id: c.id, text: c.text, metadata: c.metadata, rerank_score })
        .collect()
}

fn by_score_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::types::Meta;

    fn cand(id: &str) -> Candidate {
        Candidate { id: id.into(), text: id.into(), metadata: Meta::new(), distance: 0.0 }
    }

    #[test]
    fn rank_is_stable_and_puts_nan_last() {
        let cands = vec![cand("a"), cand("b"), cand("c"), cand("d")];
        let out = rank(cands, vec![0.5, f32::NAN, 0.9, 0.5], 4);
        let ids: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn rank_truncates() {
        let out = rank(vec![cand("a"), cand("b")], vec![1.0, 2.0], 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "b");
        assert_eq!(out[0].rerank_score, 2.0);
    }
}
