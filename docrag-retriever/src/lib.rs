//! docrag-retriever: document indexing and retrieval over named collections
//!
//! Files in common office formats are extracted to text, split into
//! overlapping token windows, embedded and stored in named collections. Queries
//! are answered from one collection or from all of them, ranked by similarity.
//!
//! ## Key Modules
//!
//! - **[`extract`]**: text extraction by file extension (txt, md, pdf, docx, pptx, xlsx, xls, hwp)
//! - **[`storage`]**: collection store abstraction with a SQLite implementation
//! - **[`retrieval`]**: indexing, search, collection catalog and context rendering
//! - **[`config`]**: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docrag_context::{ChunkingConfig, TokenChunker, tokenizer::CharTokenizerSource};
//! use docrag_embed::HashingEmbedProvider;
//! use docrag_retriever::extract::{DEFAULT_HWP_COMMAND, ExtractorRegistry};
//! use docrag_retriever::retrieval::{DocumentIndexer, IndexRequest, search_all_collections};
//! use docrag_retriever::storage::sqlite_store::SqliteStore;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = SqliteStore::open(
//!     Path::new("docrag.db"),
//!     Arc::new(HashingEmbedProvider::default()),
//! ).await?;
//! let chunker = TokenChunker::new(Arc::new(CharTokenizerSource), ChunkingConfig::default())?;
//! let indexer = DocumentIndexer::new(ExtractorRegistry::with_defaults(DEFAULT_HWP_COMMAND), chunker);
//!
//! indexer.index_document(&store, IndexRequest::new("handbook", "policy.pdf")).await?;
//! let results = search_all_collections(&store, "paid leave", 5).await?;
//! for hit in results.hits {
//!     println!("{:.3} {}", hit.relevance_score, hit.metadata.source);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! File → Extractor → TokenChunker → SqliteStore (embed + persist)
//!                                        ↓
//!            rendered context ← ranked hits ← query
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod retrieval;
pub mod storage;

pub use config::RetrieverConfig;
pub use error::{Result, RetrieverError};
