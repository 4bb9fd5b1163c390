use std::hash::{Hash, Hasher};

use anyhow::Result;
use twox_hash::XxHash64;

use ragdb_core::traits::Embedder;

pub const DEFAULT_HASH_DIM: usize = 384;

/// Bag-of-tokens embedder: each whitespace token is hashed into one of `dim`
/// buckets. Deterministic across runs and platforms.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), id: format!("hash-xxh64-{}", dim.max(1)) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            // no tokens: a fixed unit vector keeps the output normalized
            v[0] = 1.0;
            return v;
        }
        v.iter_mut().for_each(|x| *x /= norm);
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self { Self::new(DEFAULT_HASH_DIM) }
}

impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_tokens_raise_similarity() {
        let e = HashEmbedder::new(384);
        let a = e.embed_one("refund policy for damaged items");
        let b = e.embed_one("damaged items refund");
        let c = e.embed_one("office parking rules");
        let dot = |x: &[f32], y: &[f32]| x.iter().zip(y).map(|(p, q)| p * q).sum::<f32>();
        assert!(dot(&a, &b) > dot(&a, &c));
    }

    #[test]
    fn empty_text_is_still_unit_length() {
        let v = HashEmbedder::new(8).embed_one("   ");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }
}
