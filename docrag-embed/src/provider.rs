//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use fnv::FnvHasher;
use half::f16;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result, inferring the dimension from the first vector.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::embedding_gen("No embedding generated for text"))
    }

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Convert f32 embeddings to f16, optionally scaling each to unit length.
pub fn to_f16(embedding: Vec<f32>, normalize: bool) -> Vec<f16> {
    let mut values = embedding;
    if normalize {
        let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut values {
                *value /= norm;
            }
        }
    }
    values.into_iter().map(f16::from_f32).collect()
}

/// Type alias for cached model entries (model, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Global cache for initialized embedding models to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn model_cache() -> Result<MutexGuard<'static, HashMap<String, ModelCacheEntry>>> {
    MODEL_CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .map_err(|_| EmbedError::model_init("model cache lock poisoned"))
}

/// FastEmbed-based embedding provider using local ONNX models.
///
/// Models are downloaded on first use into the configured cache directory and
/// kept in a process-wide cache, so several providers built from the same
/// configuration share one loaded model.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Load (or reuse) the configured model.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        let cache_key = Self::cache_key(&config);

        let cached = model_cache()?
            .get(&cache_key)
            .map(|(model, dim)| (Arc::clone(model), *dim));
        if let Some((model, dimension)) = cached {
            tracing::info!("Using cached model for: {}", config.model_name());
            return Ok(Self {
                config,
                model,
                dimension,
            });
        }

        if let Some(dir) = &config.cache_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let load_config = config.clone();
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                tracing::info!("Loading embedding model: {}", load_config.model_name());

                let mut init_options =
                    InitOptions::new(load_config.model()?).with_show_download_progress(false);
                if let Some(dir) = &load_config.cache_dir {
                    init_options = init_options.with_cache_dir(dir.clone());
                }

                let mut model =
                    TextEmbedding::try_new(init_options).map_err(EmbedError::model_init)?;

                // Probe once for the output dimension
                let probe = model
                    .embed(vec!["dimension probe"], None)
                    .map_err(EmbedError::model_init)?;
                let dimension = probe.first().map(|emb| emb.len()).unwrap_or(0);
                if dimension == 0 {
                    return Err(EmbedError::model_init("model produced an empty embedding"));
                }

                tracing::info!("Model loaded successfully. Dimension: {}", dimension);
                Ok((model, dimension))
            })
            .await??;

        let model = Arc::new(Mutex::new(model));
        model_cache()?.insert(cache_key, (Arc::clone(&model), dimension));

        Ok(Self {
            config,
            model,
            dimension,
        })
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    fn cache_key(config: &EmbedConfig) -> String {
        let mut hasher = FnvHasher::default();
        hasher.write(config.model_name().to_ascii_lowercase().as_bytes());
        if let Some(dir) = &config.cache_dir {
            hasher.write(dir.to_string_lossy().as_bytes());
        }
        format!("v1:{:x}", hasher.finish())
    }

    /// Clears the global model cache.
    pub fn clear_cache() {
        if let Ok(mut cache) = model_cache() {
            cache.clear();
            tracing::info!("Model cache cleared");
        }
    }

    /// Returns the number of cached models.
    pub fn cache_size() -> usize {
        model_cache().map(|cache| cache.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            let batch = batch.to_vec();
            let model = Arc::clone(&self.model);

            let embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut guard = model
                    .lock()
                    .map_err(|_| EmbedError::embedding_gen("embedding model lock poisoned"))?;
                guard.embed(batch, None).map_err(EmbedError::embedding_gen)
            })
            .await??;

            all_embeddings.extend(
                embeddings
                    .into_iter()
                    .map(|embedding| to_f16(embedding, self.config.normalize)),
            );
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
