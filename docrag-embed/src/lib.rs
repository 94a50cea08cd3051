//! # docrag-embed
//!
//! Text embeddings for the document store. Documents are embedded when they
//! are written to a collection and query texts when a collection is searched.
//!
//! ## Key Components
//!
//! - [`EmbeddingProvider`]: async trait implemented by every provider
//! - [`FastEmbedProvider`]: local ONNX models through `fastembed`, cached per process
//! - [`HashingEmbedProvider`]: feature-hashing embeddings, no model download
//! - [`EmbedConfig`]: model selection, cache directory and batching
//!
//! ## Quick Start
//!
//! ```no_run
//! use docrag_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! Embeddings are stored as half-precision (`f16`) and L2-normalized unless
//! [`EmbedConfig::normalize`] is turned off, so cosine similarity reduces to
//! a dot product.

pub mod config;
pub mod error;
pub mod hashing;
pub mod provider;

pub use config::{DEFAULT_EMBED_MODEL, EmbedConfig, SUPPORTED_MODELS};
pub use error::{EmbedError, Result};
pub use hashing::HashingEmbedProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
