use std::collections::BTreeSet;

use anyhow::Result;

use ragdb_core::traits::Reranker;

/// Query-term overlap scorer: share of distinct query terms present in the
/// passage, plus a small bonus per repeated occurrence.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalReranker;

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl LexicalReranker {
    fn score_one(query_terms: &BTreeSet<String>, passage: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let passage_terms = terms(passage);
        let matched = query_terms.iter().filter(|q| passage_terms.contains(q)).count();
        let occurrences = passage_terms.iter().filter(|t| query_terms.contains(*t)).count();
        let coverage = matched as f32 / query_terms.len() as f32;
        let bonus = (occurrences.saturating_sub(matched)) as f32 * 0.01;
        coverage + bonus.min(0.1)
    }
}

impl Reranker for LexicalReranker {
    fn score_batch(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
        let query_terms: BTreeSet<String> = terms(query).into_iter().collect();
        Ok(candidates.iter().map(|c| Self::score_one(&query_terms, c)).collect())
    }
}
