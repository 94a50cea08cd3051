//! Runtime configuration for the `docrag` binary and library callers.
//!
//! Values are layered: built-in defaults, then a TOML file, then environment
//! overrides. Command line flags are applied last by the binary through the
//! `with_*` setters.
//!
//! ```toml
//! database_path = "/srv/docrag/docrag.db"
//! tokenizer = "Xenova/gpt-4"
//! default_top_k = 5
//! embedding_backend = "fastembed"
//! reserved_key_policy = { namespace = "user_" }
//!
//! [chunking]
//! chunk_size = 500
//! overlap = 50
//!
//! [embedding]
//! model = "multilingual-e5-small"
//! batch_size = 16
//! ```

use crate::error::{Result, RetrieverError};
use crate::extract::DEFAULT_HWP_COMMAND;
use crate::retrieval::catalog::DEFAULT_SAMPLE_LIMIT;
use crate::retrieval::metadata::ReservedKeyPolicy;
use crate::retrieval::search::DEFAULT_TOP_K;
use docrag_context::ChunkingConfig;
use docrag_context::tokenizer::DEFAULT_TOKENIZER_MODEL;
use docrag_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider, HashingEmbedProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Path of a TOML configuration file, used when none is passed explicitly.
pub const ENV_CONFIG: &str = "DOCRAG_CONFIG";
/// Overrides [`RetrieverConfig::database_path`].
pub const ENV_DATABASE: &str = "DOCRAG_DB";
/// Overrides [`RetrieverConfig::tokenizer`].
pub const ENV_TOKENIZER: &str = "DOCRAG_TOKENIZER";
/// Overrides the embedding model name.
pub const ENV_EMBED_MODEL: &str = "DOCRAG_EMBED_MODEL";
/// Overrides [`RetrieverConfig::embedding_backend`].
pub const ENV_EMBED_BACKEND: &str = "DOCRAG_EMBED_BACKEND";

const DATA_DIR: &str = ".docrag";
const DATABASE_FILE: &str = "docrag.db";

/// Which provider turns documents and queries into vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local ONNX model named by [`EmbedConfig::model_name`]
    #[default]
    FastEmbed,
    /// Feature hashing; no model download, lower quality
    Hashing,
}

impl FromStr for EmbeddingBackend {
    type Err = RetrieverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fastembed" => Ok(Self::FastEmbed),
            "hashing" => Ok(Self::Hashing),
            other => Err(RetrieverError::config(format!(
                "unknown embedding backend '{other}' (expected fastembed or hashing)"
            ))),
        }
    }
}

/// Configuration of the indexer, the store and the search defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// SQLite database file, created on first use
    pub database_path: PathBuf,
    /// Tokenizer spec: hub identifier, path to a `tokenizer.json`, or `chars`
    pub tokenizer: String,
    pub chunking: ChunkingConfig,
    pub default_top_k: usize,
    /// Chunks sampled when describing a collection
    pub info_sample_limit: usize,
    /// `fastembed` or `hashing`
    pub embedding_backend: EmbeddingBackend,
    pub embedding: EmbedConfig,
    /// Command that converts an HWP file to text on stdout
    pub hwp_command: String,
    pub reserved_key_policy: ReservedKeyPolicy,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            tokenizer: DEFAULT_TOKENIZER_MODEL.to_string(),
            chunking: ChunkingConfig::default(),
            default_top_k: DEFAULT_TOP_K,
            info_sample_limit: DEFAULT_SAMPLE_LIMIT,
            embedding_backend: EmbeddingBackend::default(),
            embedding: EmbedConfig::default(),
            hwp_command: DEFAULT_HWP_COMMAND.to_string(),
            reserved_key_policy: ReservedKeyPolicy::default(),
        }
    }
}

/// `~/.docrag/docrag.db`, or a relative `.docrag/docrag.db` when there is no home directory.
pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(DATA_DIR)
        .join(DATABASE_FILE)
}

impl RetrieverConfig {
    /// Load from `path` (or `$DOCRAG_CONFIG`), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with an explicit environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| lookup(ENV_CONFIG).map(PathBuf::from));

        let config = match path {
            Some(path) => {
                tracing::debug!("Reading configuration from {}", path.display());
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    RetrieverError::config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        let config = config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RetrieverError::config(e.to_string()))
    }

    /// Apply the `DOCRAG_*` overrides. Empty values are ignored.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = get(ENV_DATABASE) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(tokenizer) = get(ENV_TOKENIZER) {
            self.tokenizer = tokenizer;
        }
        if let Some(model) = get(ENV_EMBED_MODEL) {
            self.embedding.model_name = model;
        }
        if let Some(backend) = get(ENV_EMBED_BACKEND) {
            self.embedding_backend = backend.parse()?;
        }
        Ok(self)
    }

    /// Build the configured embedding provider. FastEmbed loads (and on first use downloads) its model.
    pub async fn embedding_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match self.embedding_backend {
            EmbeddingBackend::FastEmbed => Ok(Arc::new(
                FastEmbedProvider::create(self.embedding.clone()).await?,
            )),
            EmbeddingBackend::Hashing => {
                tracing::debug!("Using the hashing embedder");
                Ok(Arc::new(HashingEmbedProvider::default()))
            }
        }
    }

    /// Reject values that would only fail later, deep inside an operation.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.embedding.validate()?;
        if self.tokenizer.trim().is_empty() {
            return Err(RetrieverError::config("tokenizer must not be empty"));
        }
        if self.default_top_k == 0 {
            return Err(RetrieverError::config("default_top_k must be at least 1"));
        }
        if self.info_sample_limit == 0 {
            return Err(RetrieverError::config("info_sample_limit must be at least 1"));
        }
        if self.hwp_command.trim().is_empty() {
            return Err(RetrieverError::config("hwp_command must not be empty"));
        }
        Ok(())
    }

    pub fn with_database_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.database_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: impl Into<String>) -> Self {
        self.tokenizer = tokenizer.into();
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn with_embedding_backend(mut self, backend: EmbeddingBackend) -> Self {
        self.embedding_backend = backend;
        self
    }

    pub fn with_embedding(mut self, embedding: EmbedConfig) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_reserved_key_policy(mut self, policy: ReservedKeyPolicy) -> Self {
        self.reserved_key_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RetrieverConfig::default();
        assert!(config.database_path.ends_with(".docrag/docrag.db"));
        assert_eq!(config.tokenizer, "Xenova/gpt-4");
        assert_eq!(config.chunking, ChunkingConfig::new(500, 50));
        assert_eq!(config.default_top_k, 5);
        assert_eq!(config.info_sample_limit, 100);
        assert_eq!(config.hwp_command, "hwp5txt");
        assert_eq!(config.reserved_key_policy, ReservedKeyPolicy::Reject);
        assert_eq!(config.embedding_backend, EmbeddingBackend::FastEmbed);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RetrieverConfig::from_toml_str(
            r#"
            database_path = "/tmp/docs.db"
            reserved_key_policy = { namespace = "meta_" }

            [chunking]
            chunk_size = 200

            [embedding]
            model = "bge-small-en-v1.5"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/docs.db"));
        assert_eq!(config.chunking, ChunkingConfig::new(200, 50));
        assert_eq!(config.embedding.model_name, "bge-small-en-v1.5");
        assert_eq!(config.embedding.batch_size, 16);
        assert_eq!(
            config.reserved_key_policy,
            ReservedKeyPolicy::Namespace("meta_".to_string())
        );
        assert_eq!(config.tokenizer, DEFAULT_TOKENIZER_MODEL);
    }

    #[tokio::test]
    async fn test_hashing_backend_from_toml_and_env() -> anyhow::Result<()> {
        let config = RetrieverConfig::from_toml_str("embedding_backend = \"hashing\"")?;
        assert_eq!(config.embedding_backend, EmbeddingBackend::Hashing);
        let provider = config.embedding_provider().await?;
        assert_eq!(provider.provider_name(), "hashing");

        let from_env =
            RetrieverConfig::default().apply_env(env(&[(ENV_EMBED_BACKEND, "Hashing")]))?;
        assert_eq!(from_env.embedding_backend, EmbeddingBackend::Hashing);

        let err = RetrieverConfig::default()
            .apply_env(env(&[(ENV_EMBED_BACKEND, "word2vec")]))
            .unwrap_err();
        assert!(matches!(err, RetrieverError::Config { .. }));
        Ok(())
    }

    #[test]
    fn test_malformed_toml() {
        let err = RetrieverConfig::from_toml_str("default_top_k = \"five\"").unwrap_err();
        assert!(matches!(err, RetrieverError::Config { .. }));
    }

    #[test]
    fn test_env_overrides_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("docrag.toml");
        std::fs::write(&path, "tokenizer = \"chars\"\ndatabase_path = \"/from/file.db\"\n")?;

        let config = RetrieverConfig::load_with(
            Some(&path),
            env(&[
                (ENV_DATABASE, "/from/env.db"),
                (ENV_EMBED_MODEL, "all-minilm-l6-v2"),
                (ENV_TOKENIZER, ""),
            ]),
        )?;
        assert_eq!(config.database_path, PathBuf::from("/from/env.db"));
        assert_eq!(config.embedding.model_name, "all-minilm-l6-v2");
        // Empty override ignored
        assert_eq!(config.tokenizer, "chars");
        Ok(())
    }

    #[test]
    fn test_config_path_from_env() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "default_top_k = 9\n")?;

        let path_str = path.display().to_string();
        let config = RetrieverConfig::load_with(None, env(&[(ENV_CONFIG, path_str.as_str())]))?;
        assert_eq!(config.default_top_k, 9);
        Ok(())
    }

    #[test]
    fn test_missing_file_and_invalid_values() {
        let err = RetrieverConfig::load_with(Some(Path::new("/nonexistent/docrag.toml")), env(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/docrag.toml"));

        let zero_k = RetrieverConfig::default().with_default_top_k(0);
        assert!(matches!(zero_k.validate(), Err(RetrieverError::Config { .. })));

        let bad_window = RetrieverConfig::default().with_chunking(ChunkingConfig::new(10, 10));
        assert!(matches!(bad_window.validate(), Err(RetrieverError::Chunking { .. })));

        let bad_model = RetrieverConfig::default().with_embedding(EmbedConfig::new("word2vec"));
        assert!(matches!(bad_model.validate(), Err(RetrieverError::Embedding { .. })));
    }
}
