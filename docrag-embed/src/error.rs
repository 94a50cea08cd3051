//! Error types for the embedding system

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Covers configuration problems (unknown model names, invalid batch sizes),
/// model loading, and failures while generating embeddings.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The configured model name is not one of the supported models
    #[error("Unknown embedding model '{name}' (supported: {supported})")]
    UnknownModel { name: String, supported: String },

    /// Error when model configuration is invalid
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors when preparing the model cache directory
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl EmbedError {
    /// Create a model initialization error from any error type.
    pub fn model_init<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ModelInitialization {
            source: source.into(),
        }
    }

    /// Create an embedding generation error from any error type.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::EmbeddingGeneration {
            source: source.into(),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
