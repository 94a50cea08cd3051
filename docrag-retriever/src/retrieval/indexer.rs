//! Document indexing: extract, chunk, resolve the collection, supersede, write.
//!
//! ## Supersede on re-index
//!
//! Chunks are keyed by the base name of their source file. Indexing a file
//! whose name is already present in the collection first deletes every chunk
//! with that `source` and then writes the new batch, so the collection ends up
//! with exactly the chunks of the latest run. Record ids embed the indexing
//! timestamp and therefore change on every run.
//!
//! The lookup/delete step is best effort: if it fails, the failure is logged,
//! reported as [`SupersedeOutcome::Skipped`], and the new chunks are written
//! anyway. Until the next successful re-index the collection may then hold
//! both the old and the new chunks of that file. The final write is never
//! best effort; its failure is returned to the caller.

use super::metadata::{ChunkMetadata, ReservedKeyPolicy, SOURCE, chunk_record_id};
use crate::error::{Result, RetrieverError};
use crate::extract::ExtractorRegistry;
use crate::storage::{
    AddBatch, CollectionHandle, CollectionMetadata, CollectionStore, GetRequest, Metadata,
    StoreError, WhereFilter, validate_metadata,
};
use chrono::Utc;
use docrag_context::{ChunkingConfig, TokenChunker};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Description given to collections created without one.
pub const DEFAULT_COLLECTION_DESCRIPTION: &str = "Document collection";

/// One file to index into one collection.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub collection: String,
    pub file_path: PathBuf,
    /// Used only when the collection has to be created
    pub description: Option<String>,
    /// Caller fields merged into every chunk's metadata
    pub metadata: Metadata,
    /// Overrides the indexer's window parameters for this file
    pub chunking: Option<ChunkingConfig>,
}

impl IndexRequest {
    pub fn new(collection: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            collection: collection.into(),
            file_path: file_path.into(),
            description: None,
            metadata: Metadata::new(),
            chunking: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = Some(chunking);
        self
    }
}

/// What happened to the chunks a previous run left for the same file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum SupersedeOutcome {
    /// The file had not been indexed into this collection before
    NothingToReplace,
    /// This many old chunks were deleted
    Replaced(usize),
    /// Lookup or delete failed; old chunks may remain alongside the new ones
    Skipped(String),
}

/// Result of indexing one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub collection_name: String,
    pub file_name: String,
    pub num_chunks: usize,
    pub num_pages: usize,
    pub title: String,
    pub superseded: SupersedeOutcome,
}

/// Indexes files into collections of any [`CollectionStore`].
#[derive(Debug, Clone)]
pub struct DocumentIndexer {
    extractors: ExtractorRegistry,
    chunker: TokenChunker,
    reserved_keys: ReservedKeyPolicy,
}

impl DocumentIndexer {
    pub fn new(extractors: ExtractorRegistry, chunker: TokenChunker) -> Self {
        Self {
            extractors,
            chunker,
            reserved_keys: ReservedKeyPolicy::default(),
        }
    }

    pub fn with_reserved_key_policy(mut self, policy: ReservedKeyPolicy) -> Self {
        self.reserved_keys = policy;
        self
    }

    pub fn extractors(&self) -> &ExtractorRegistry {
        &self.extractors
    }

    /// Index one file. See the module docs for the supersede semantics.
    pub async fn index_document<S: CollectionStore>(
        &self,
        store: &S,
        request: IndexRequest,
    ) -> Result<IndexReport> {
        let path = request.file_path.as_path();
        // Only a definite "absent" is FileNotFound; permission and IO errors propagate as Io
        if !tokio::fs::try_exists(path).await? {
            return Err(RetrieverError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let file_name = file_name(path);
        let extra = self.reserved_keys.apply(request.metadata.clone())?;
        validate_metadata(&extra)
            .map_err(|e| RetrieverError::store("validate metadata for", &request.collection, e))?;

        let document = self.extractors.extract(path).await?;

        let chunker = match request.chunking {
            Some(config) => self.chunker.with_config(config)?,
            None => self.chunker.clone(),
        };
        let chunks = chunker.split(&document.text)?;
        tracing::debug!("{} split into {} chunks", file_name, chunks.len());

        let description = request
            .description
            .as_deref()
            .unwrap_or(DEFAULT_COLLECTION_DESCRIPTION);
        let handle = resolve_collection(store, &request.collection, description).await?;

        let superseded = match supersede_existing(&handle, &file_name).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    "Could not remove previous chunks of {} from {}, writing new chunks anyway: {}",
                    file_name,
                    request.collection,
                    e
                );
                SupersedeOutcome::Skipped(e.to_string())
            }
        };

        let report = IndexReport {
            collection_name: request.collection.clone(),
            file_name: file_name.clone(),
            num_chunks: chunks.len(),
            num_pages: document.page_count,
            title: document.title,
            superseded,
        };

        if chunks.is_empty() {
            tracing::info!("{} has no text, nothing written to {}", file_name, request.collection);
            return Ok(report);
        }

        let indexed_at = Utc::now();
        let millis = indexed_at.timestamp_millis();
        let file_path = path.display().to_string();
        let total_chunks = chunks.len();

        let mut batch = AddBatch::default();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let metadata = ChunkMetadata {
                chunk_index: index,
                total_chunks,
                start_token: chunk.start_token,
                end_token: chunk.end_token,
                source: file_name.clone(),
                file_path: file_path.clone(),
                collection: request.collection.clone(),
                indexed_at,
                extra: extra.clone(),
            };
            batch.push(
                chunk_record_id(&request.collection, &file_name, millis, index),
                chunk.text,
                metadata.to_metadata(),
            );
        }

        handle
            .add(batch)
            .await
            .map_err(|e| RetrieverError::store("add chunks to", &request.collection, e))?;

        tracing::info!(
            "Indexed {} into {}: {} chunks, {} pages",
            file_name,
            request.collection,
            report.num_chunks,
            report.num_pages
        );
        Ok(report)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Fetch a collection, creating it when absent.
///
/// Losing a creation race to a concurrent caller counts as success: the
/// collection is fetched again and returned.
pub async fn resolve_collection<S: CollectionStore>(
    store: &S,
    name: &str,
    description: &str,
) -> Result<S::Handle> {
    match store.get_collection(name).await {
        Ok(handle) => Ok(handle),
        Err(StoreError::NotFound { .. }) => {
            match store
                .create_collection(name, CollectionMetadata::new(description))
                .await
            {
                Ok(handle) => {
                    tracing::info!("Created collection {}", name);
                    Ok(handle)
                }
                Err(StoreError::AlreadyExists { .. }) => {
                    tracing::debug!("Collection {} was created concurrently", name);
                    store
                        .get_collection(name)
                        .await
                        .map_err(|e| RetrieverError::store("get collection", name, e))
                }
                Err(e) => Err(RetrieverError::store("create collection", name, e)),
            }
        }
        Err(e) => Err(RetrieverError::store("get collection", name, e)),
    }
}

/// Delete the chunks a previous run wrote for `file_name`.
pub async fn supersede_existing<H: CollectionHandle>(
    handle: &H,
    file_name: &str,
) -> Result<SupersedeOutcome> {
    let existing = handle
        .get(GetRequest::new().with_filter(WhereFilter::eq(SOURCE, file_name)))
        .await
        .map_err(|e| RetrieverError::store("look up previous chunks in", handle.name(), e))?;

    if existing.ids.is_empty() {
        return Ok(SupersedeOutcome::NothingToReplace);
    }

    let removed = handle
        .delete(WhereFilter::eq(SOURCE, file_name))
        .await
        .map_err(|e| RetrieverError::store("delete previous chunks from", handle.name(), e))?;
    tracing::debug!("Removed {} previous chunks of {}", removed, file_name);
    Ok(SupersedeOutcome::Replaced(removed))
}
