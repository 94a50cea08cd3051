//! Error types for indexing and retrieval

use crate::storage::StoreError;
use docrag_context::ChunkError;
use docrag_embed::EmbedError;
use std::path::PathBuf;

/// Result type for indexing and retrieval operations.
pub type Result<T> = std::result::Result<T, RetrieverError>;

/// Errors surfaced by the indexer, the search aggregator and the catalog.
///
/// Store failures are split by kind: connectivity problems become
/// [`RetrieverError::StoreUnavailable`], a missing collection becomes
/// [`RetrieverError::CollectionNotFound`], anything else keeps the original
/// [`StoreError`] as its source. Every store variant names the operation and
/// its target.
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// No extractor is registered for the file's extension
    #[error("Unsupported file format: {extension}. Supported formats: {}", .supported.join(", "))]
    UnsupportedFormat {
        extension: String,
        supported: Vec<String>,
    },

    /// The extractor for a supported format failed
    #[error("Failed to extract text from {}: {message}", .path.display())]
    ExtractionFailure { path: PathBuf, message: String },

    /// The input file does not exist
    #[error("File not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    /// The store could not be reached
    #[error("Failed to {operation} '{target}': store unavailable: {message}")]
    StoreUnavailable {
        operation: String,
        target: String,
        message: String,
    },

    /// A read operation named a collection that does not exist
    #[error("Collection '{collection}' not found")]
    CollectionNotFound { collection: String },

    /// Any other store failure
    #[error("Failed to {operation} '{target}': {source}")]
    Store {
        operation: String,
        target: String,
        #[source]
        source: StoreError,
    },

    /// Caller metadata tried to set a field the indexer owns
    #[error("Metadata key '{key}' is reserved")]
    ReservedMetadataKey { key: String },

    /// Chunking failed
    #[error("Chunking failed: {source}")]
    Chunking {
        #[from]
        source: ChunkError,
    },

    /// The embedding provider could not be set up
    #[error("Embedding setup failed: {source}")]
    Embedding {
        #[from]
        source: EmbedError,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// IO errors while reading inputs or configuration
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl RetrieverError {
    /// Attach the failed operation and its target to a store error.
    pub fn store(operation: impl Into<String>, target: impl Into<String>, err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { message } => Self::StoreUnavailable {
                operation: operation.into(),
                target: target.into(),
                message,
            },
            StoreError::NotFound { collection } => Self::CollectionNotFound { collection },
            source => Self::Store {
                operation: operation.into(),
                target: target.into(),
                source,
            },
        }
    }

    pub fn extraction<S: Into<String>>(path: impl Into<PathBuf>, message: S) -> Self {
        Self::ExtractionFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_keep_operation_and_target() {
        let err = RetrieverError::store(
            "query collection",
            "reports",
            StoreError::unavailable("connection refused"),
        );
        assert!(matches!(err, RetrieverError::StoreUnavailable { .. }));
        assert_eq!(
            err.to_string(),
            "Failed to query collection 'reports': store unavailable: connection refused"
        );

        let err = RetrieverError::store(
            "get collection",
            "missing",
            StoreError::NotFound {
                collection: "missing".into(),
            },
        );
        assert!(matches!(err, RetrieverError::CollectionNotFound { ref collection } if collection == "missing"));

        let err = RetrieverError::store(
            "add chunks to",
            "reports",
            StoreError::invalid_request("duplicate id"),
        );
        assert!(err.to_string().contains("add chunks to 'reports'"));
        assert!(err.to_string().contains("duplicate id"));
    }

    #[test]
    fn test_unsupported_format_lists_extensions() {
        let err = RetrieverError::UnsupportedFormat {
            extension: ".exe".into(),
            supported: vec![".md".into(), ".pdf".into(), ".txt".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unsupported file format: .exe. Supported formats: .md, .pdf, .txt"
        );
    }
}
