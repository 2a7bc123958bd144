//! Text-to-vector embedding capability.
//!
//! Provides the [`EmbeddingProvider`] trait plus two implementations: a local
//! ONNX sentence-transformer ([`local`]) and a deterministic feature-hashing
//! embedder ([`hashing`]) that needs no model files. Providers are created via
//! [`create_provider`] from configuration.

pub mod hashing;
pub mod local;

use anyhow::Result;

use crate::config::EmbeddingConfig;

/// Trait for embedding text into vectors.
///
/// A provider always yields vectors of [`EmbeddingProvider::dimensions`] width.
/// All methods are synchronous; async callers go through
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("provider returned no vector for one input"))
    }

    /// Embed a batch of text strings, one vector per input, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    /// Identifier recorded alongside index snapshots.
    fn model_id(&self) -> &str;
}

/// Create an embedding provider from config.
///
/// `"local"` needs model files (run `noesis model download` first);
/// `"hashing"` always succeeds; `"none"` disables embeddings.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => Ok(Box::new(local::LocalEmbeddingProvider::new(config)?)),
        "hashing" => Ok(Box::new(hashing::HashingEmbeddingProvider::new(
            config.dimensions,
        )?)),
        "none" => anyhow::bail!("embedding provider disabled by configuration"),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local, hashing, none"),
    }
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Cosine similarity; `0.0` when either side has zero norm.
#[cfg(test)]
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
