//! Feature-hashing embedder.
//!
//! Lowercases text, splits it on non-alphanumeric characters, and counts each
//! token into bucket `fnv1a(token) % dimensions`. The count vector is
//! L2-normalized, so texts sharing more tokens score a higher cosine. Fully
//! deterministic and dependency-free, which makes it the offline fallback and
//! the provider tests run against.

use anyhow::{ensure, Result};

use super::{l2_normalize, EmbeddingProvider};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

pub struct HashingEmbeddingProvider {
    dimensions: usize,
    model_id: String,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Result<Self> {
        ensure!(dimensions > 0, "hashing embedder needs at least one dimension");
        Ok(Self {
            dimensions,
            model_id: format!("hashing-{dimensions}"),
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let bucket = (fnv1a(token.as_bytes()) % self.dimensions as u64) as usize;
            v[bucket] += 1.0;
        }
        l2_normalize(&v)
    }
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn identical_text_embeds_identically() {
        let provider = HashingEmbeddingProvider::new(512).unwrap();
        let a = provider.embed("Rust ownership rules").unwrap();
        let b = provider.embed("rust OWNERSHIP rules!").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 512);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn shared_tokens_raise_similarity() {
        let provider = HashingEmbeddingProvider::new(512).unwrap();
        let query = provider.embed("capital of France").unwrap();
        let paris = provider.embed("Paris is the capital of France").unwrap();
        let berlin = provider.embed("Berlin is the capital of Germany").unwrap();
        assert!(cosine_similarity(&query, &paris) > cosine_similarity(&query, &berlin));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let provider = HashingEmbeddingProvider::new(8).unwrap();
        assert_eq!(provider.embed("  ,, ").unwrap(), vec![0.0; 8]);
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(HashingEmbeddingProvider::new(0).is_err());
    }
}
