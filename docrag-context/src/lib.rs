//! docrag-context: token-bounded chunking for document retrieval.
//!
//! Documents are indexed as overlapping windows of tokens. This crate owns the
//! two pieces needed for that:
//!
//! - [`tokenizer`]: a narrow encode/decode adapter over a single fixed model
//! - [`chunker`]: the window walk and decoding of each window back to text
//!
//! ```
//! use docrag_context::{ChunkingConfig, TokenChunker};
//! use docrag_context::tokenizer::CharTokenizerSource;
//! use std::sync::Arc;
//!
//! let chunker = TokenChunker::new(Arc::new(CharTokenizerSource), ChunkingConfig::default()).unwrap();
//! let chunks = chunker.split("A short document.").unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].start_token, 0);
//! ```

pub mod chunker;
pub mod error;
pub mod tokenizer;

pub use chunker::{Chunk, ChunkingConfig, TokenChunker, token_windows};
pub use error::{ChunkError, Result};
pub use tokenizer::{Tokenizer, TokenizerSource};
