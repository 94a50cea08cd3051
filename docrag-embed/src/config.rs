//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use fastembed::EmbeddingModel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default model: small, multilingual, 384 dimensions.
pub const DEFAULT_EMBED_MODEL: &str = "multilingual-e5-small";

/// Default number of texts sent to the model in one call.
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Names accepted in [`EmbedConfig::model_name`] and the fastembed model each selects.
pub const SUPPORTED_MODELS: &[(&str, EmbeddingModel)] = &[
    ("multilingual-e5-small", EmbeddingModel::MultilingualE5Small),
    ("all-minilm-l6-v2", EmbeddingModel::AllMiniLML6V2),
    ("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15),
    (
        "paraphrase-multilingual-minilm-l12-v2",
        EmbeddingModel::ParaphraseMLMiniLML12V2,
    ),
];

/// Configuration for embedding models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Name of the embedding model to use, see [`SUPPORTED_MODELS`]
    #[serde(alias = "model")]
    pub model_name: String,
    /// Where downloaded model files are kept. `None` uses fastembed's default.
    pub cache_dir: Option<PathBuf>,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_EMBED_MODEL.to_string(),
            cache_dir: None,
            batch_size: DEFAULT_BATCH_SIZE,
            normalize: true,
        }
    }
}

impl EmbedConfig {
    /// Create a configuration for the named model with default settings.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Set the model cache directory (builder style)
    pub fn with_cache_dir<P: AsRef<Path>>(self, cache_dir: P) -> Self {
        Self {
            cache_dir: Some(cache_dir.as_ref().to_path_buf()),
            ..self
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Resolve the configured name to a fastembed model.
    pub fn model(&self) -> Result<EmbeddingModel> {
        let wanted = self.model_name.to_ascii_lowercase();
        SUPPORTED_MODELS
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, model)| model.clone())
            .ok_or_else(|| EmbedError::UnknownModel {
                name: self.model_name.clone(),
                supported: SUPPORTED_MODELS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Check the configuration without loading anything.
    pub fn validate(&self) -> Result<()> {
        self.model()?;
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be at least 1"));
        }
        tracing::debug!("Embedding config validated for: {}", self.model_name);
        Ok(())
    }
}
