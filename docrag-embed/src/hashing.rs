//! Model-free embeddings by feature hashing.
//!
//! Each lower-cased word is hashed into one of `dimension` buckets with a
//! hash-derived sign, the bucket counts form the vector, and the vector is
//! scaled to unit length. Texts sharing vocabulary land close together under
//! cosine distance, which is all the retrieval tests need, and nothing has to
//! be downloaded.

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, to_f16};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

/// Default vector size for [`HashingEmbedProvider`].
pub const DEFAULT_HASHING_DIMENSION: usize = 256;

/// Deterministic bag-of-words embedding provider.
#[derive(Debug, Clone)]
pub struct HashingEmbedProvider {
    dimension: usize,
}

impl Default for HashingEmbedProvider {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASHING_DIMENSION,
        }
    }
}

impl HashingEmbedProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be at least 1"));
        }
        Ok(Self { dimension })
    }

    /// Embed one text synchronously. Text without any word yields the zero vector.
    pub fn embed_sync(&self, text: &str) -> Vec<f16> {
        let mut buckets = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = FnvHasher::default();
            hasher.write(word.to_lowercase().as_bytes());
            let hash = hasher.finish();

            let index = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            buckets[index] += sign;
        }
        to_f16(buckets, true)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let embeddings = texts.iter().map(|t| self.embed_sync(t)).collect();
        Ok(EmbeddingResult {
            embeddings,
            dimension: self.dimension,
        })
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }
}
