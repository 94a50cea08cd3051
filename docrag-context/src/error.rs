//! Error types for tokenization and chunking

/// Result type for chunking operations.
pub type Result<T> = std::result::Result<T, ChunkError>;

/// Errors raised while loading a tokenizer or splitting text into chunks.
///
/// Tokenizer failures keep the underlying error as their source so callers
/// can report the original message unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// Chunk size and overlap do not describe a valid window
    #[error("Invalid chunking configuration: {message}")]
    InvalidConfig { message: String },

    /// The tokenizer model could not be loaded
    #[error("Failed to load tokenizer '{model}': {source}")]
    TokenizerLoad {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Text could not be encoded into tokens
    #[error("Tokenization failed: {source}")]
    Encode {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A token window could not be decoded back into text
    #[error("Decoding tokens {start}..{end} failed: {message}")]
    Decode {
        start: usize,
        end: usize,
        message: String,
    },
}

impl ChunkError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Wrap a tokenizer loading failure for the given model.
    pub fn tokenizer_load<S: Into<String>>(
        model: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::TokenizerLoad {
            model: model.into(),
            source,
        }
    }
}
