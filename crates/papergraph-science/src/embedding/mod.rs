//! Text → vector collaborators used by the similarity graph builder.
//!
//! - [`HashedEmbedder`]: deterministic bag-of-words hashing, no model files.
//! - `FastEmbedder`: local ONNX sentence model (cargo feature `fastembed`).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use papergraph_core::EmbeddingConfig;

use crate::error::{Result, ScienceError};

#[cfg(feature = "fastembed")]
pub mod fastembed;

/// Order-preserving batch embedding. Vectors from different models must not
/// be compared with each other.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per input text, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build the embedder named by `embedding.backend`.
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.backend.to_ascii_lowercase().as_str() {
        "hashed" => Ok(Arc::new(HashedEmbedder::new(config.dimension))),
        #[cfg(feature = "fastembed")]
        "fastembed" | "fast-embed" | "fast" => Ok(Arc::new(
            fastembed::FastEmbedder::new(config.model.clone()).await?,
        )),
        #[cfg(not(feature = "fastembed"))]
        "fastembed" | "fast-embed" | "fast" => Err(ScienceError::Config(
            "the fastembed backend requires building with `--features fastembed`".to_string(),
        )),
        other => Err(ScienceError::Config(format!(
            "unknown embedding backend '{other}'. Expected 'hashed' or 'fastembed'."
        ))),
    }
}

// ─── HashedEmbedder ───────────────────────────────────────────────────────────

/// Token-hash embedding: each lowercase alphanumeric token increments one
/// bucket, and the result is L2-normalized. Identical text always yields an
/// identical vector.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dimension: usize,
}

impl HashedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        hashed_embedding(text, self.dimension)
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    fn model_name(&self) -> &str {
        "hashed"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

pub fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];

    for token in tokens(text) {
        vector[bucket(&token, dim)] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}
