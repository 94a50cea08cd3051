//! Listing, describing and deleting collections.

use super::metadata::SOURCE;
use crate::error::{Result, RetrieverError};
use crate::storage::{
    CollectionHandle, CollectionStore, DistanceMetric, GetRequest, Include, MetadataValue,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Number of chunk metadatas sampled by [`describe_collection`] when not configured.
pub const DEFAULT_SAMPLE_LIMIT: usize = 100;

/// One collection in a listing. Exactly one of `chunk_count` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionListing {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Documents seen in a collection sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub source: String,
    /// Chunks of this document within the sample, not in the whole collection
    pub sampled_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub distance: DistanceMetric,
    pub total_chunks: usize,
    /// Number of chunks the document list was built from
    pub sample_size: usize,
    /// Sources in the order they first appear in the sample
    pub documents: Vec<DocumentSummary>,
}

/// List every collection with its chunk count.
///
/// Failing to list is an error; failing to count one collection is reported
/// in its entry and the listing continues.
pub async fn list_collections_with_counts<S: CollectionStore>(
    store: &S,
) -> Result<Vec<CollectionListing>> {
    let names = store
        .list_collections()
        .await
        .map_err(|e| RetrieverError::store("list", "collections", e))?;

    let mut listings = Vec::with_capacity(names.len());
    for name in names {
        let counted = match store.get_collection(&name).await {
            Ok(handle) => handle.count().await,
            Err(e) => Err(e),
        };
        let listing = match counted {
            Ok(count) => CollectionListing {
                name,
                chunk_count: Some(count),
                error: None,
            },
            Err(e) => {
                tracing::warn!("Could not count chunks of {}: {}", name, e);
                CollectionListing {
                    name,
                    chunk_count: None,
                    error: Some(e.to_string()),
                }
            }
        };
        listings.push(listing);
    }
    Ok(listings)
}

/// Summarize a collection from its count and a metadata sample of at most `sample_limit` chunks.
pub async fn describe_collection<S: CollectionStore>(
    store: &S,
    name: &str,
    sample_limit: usize,
) -> Result<CollectionSummary> {
    let handle = store
        .get_collection(name)
        .await
        .map_err(|e| RetrieverError::store("get collection", name, e))?;

    let total_chunks = handle
        .count()
        .await
        .map_err(|e| RetrieverError::store("count chunks in", name, e))?;

    let sample = handle
        .get(
            GetRequest::new()
                .with_include(Include::Metadatas)
                .with_limit(sample_limit),
        )
        .await
        .map_err(|e| RetrieverError::store("sample chunks from", name, e))?;

    let metadatas = sample.metadatas.unwrap_or_default();
    let mut documents: Vec<DocumentSummary> = Vec::new();
    for metadata in &metadatas {
        let source = metadata
            .get(SOURCE)
            .map(MetadataValue::to_string)
            .unwrap_or_else(|| "unknown".to_string());
        match documents.iter_mut().find(|d| d.source == source) {
            Some(doc) => doc.sampled_chunks += 1,
            None => documents.push(DocumentSummary {
                source,
                sampled_chunks: 1,
            }),
        }
    }

    let metadata = handle.metadata();
    Ok(CollectionSummary {
        name: handle.name().to_string(),
        description: metadata.description.clone(),
        created_at: metadata.created_at,
        distance: metadata.distance,
        total_chunks,
        sample_size: metadatas.len(),
        documents,
    })
}

/// Delete a collection and every chunk in it.
pub async fn delete_collection<S: CollectionStore>(store: &S, name: &str) -> Result<()> {
    store
        .delete_collection(name)
        .await
        .map_err(|e| RetrieverError::store("delete collection", name, e))?;
    tracing::info!("Deleted collection {}", name);
    Ok(())
}
