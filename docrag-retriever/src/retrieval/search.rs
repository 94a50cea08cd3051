//! Similarity search over one collection or across all of them.
//!
//! Scores are `1 - distance` as reported by the store. For cosine distance on
//! normalized vectors that lands in `[0, 1]` for related text and can drop
//! below zero for opposed vectors; scores are passed through unclamped.
//!
//! [`search_all_collections`] ranks in two phases: every collection returns its
//! own best `top_k`, then the merged list is re-sorted by score and cut to
//! `top_k` again. The merge assumes scores from different collections are
//! comparable. That holds when they share one distance metric; when they do
//! not, a warning is logged and the ranking is used as is.

use super::metadata::{CHUNK_INDEX, COLLECTION, SOURCE};
use crate::error::{Result, RetrieverError};
use crate::storage::{
    CollectionHandle, CollectionStore, DistanceMetric, Metadata, MetadataValue, QueryRequest,
};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeSet;

/// Number of results returned when the caller does not ask for a specific count.
pub const DEFAULT_TOP_K: usize = 5;

/// Subset of chunk metadata returned with each hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HitMetadata {
    pub chunk_index: usize,
    pub source: String,
    pub collection: String,
}

impl HitMetadata {
    /// Missing fields fall back to neutral values; the collection falls back to the queried one.
    fn from_metadata(metadata: &Metadata, collection: &str) -> Self {
        Self {
            chunk_index: metadata
                .get(CHUNK_INDEX)
                .and_then(MetadataValue::as_i64)
                .and_then(|i| usize::try_from(i).ok())
                .unwrap_or_default(),
            source: metadata
                .get(SOURCE)
                .map(|v| v.to_string())
                .unwrap_or_default(),
            collection: metadata
                .get(COLLECTION)
                .and_then(MetadataValue::as_str)
                .unwrap_or(collection)
                .to_string(),
        }
    }
}

/// One retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub content: String,
    pub metadata: HitMetadata,
    /// `1 - distance`, higher is better
    pub relevance_score: f32,
}

/// A collection that could not be searched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionFailure {
    pub collection: String,
    pub error: String,
}

/// Merged result of [`search_all_collections`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedSearch {
    /// Best hits over all searchable collections, best first
    pub hits: Vec<SearchHit>,
    /// Collections skipped because their search failed
    pub failures: Vec<CollectionFailure>,
}

/// Search one collection. A collection that does not exist is an error, not an empty result.
pub async fn search_in_collection<S: CollectionStore>(
    store: &S,
    collection: &str,
    query: &str,
    top_k: usize,
) -> Result<Vec<SearchHit>> {
    let (_, hits) = search_one(store, collection, query, top_k).await?;
    Ok(hits)
}

async fn search_one<S: CollectionStore>(
    store: &S,
    collection: &str,
    query: &str,
    top_k: usize,
) -> Result<(DistanceMetric, Vec<SearchHit>)> {
    let handle = store
        .get_collection(collection)
        .await
        .map_err(|e| RetrieverError::store("get collection", collection, e))?;
    let hits = query_handle(&handle, query, top_k).await?;
    Ok((handle.metadata().distance, hits))
}

async fn query_handle<H: CollectionHandle>(
    handle: &H,
    query: &str,
    top_k: usize,
) -> Result<Vec<SearchHit>> {
    if top_k == 0 {
        return Ok(Vec::new());
    }

    let result = handle
        .query(QueryRequest::single(query, top_k))
        .await
        .map_err(|e| RetrieverError::store("query collection", handle.name(), e))?;

    let (Some(documents), Some(metadatas), Some(distances)) = (
        result.documents.into_iter().next(),
        result.metadatas.into_iter().next(),
        result.distances.into_iter().next(),
    ) else {
        return Ok(Vec::new());
    };

    let mut hits: Vec<SearchHit> = documents
        .into_iter()
        .zip(metadatas)
        .zip(distances)
        .map(|((content, metadata), distance)| SearchHit {
            content,
            metadata: HitMetadata::from_metadata(&metadata, handle.name()),
            relevance_score: 1.0 - distance,
        })
        .collect();
    hits.truncate(top_k);

    tracing::debug!("{} hits from {}", hits.len(), handle.name());
    Ok(hits)
}

/// Search every collection and merge the results.
///
/// Failing to list collections is fatal. A collection whose search fails is
/// recorded in [`AggregatedSearch::failures`] and skipped; the others still
/// contribute. Collections are queried concurrently.
pub async fn search_all_collections<S: CollectionStore>(
    store: &S,
    query: &str,
    top_k: usize,
) -> Result<AggregatedSearch> {
    let names = store
        .list_collections()
        .await
        .map_err(|e| RetrieverError::store("list", "collections", e))?;

    let outcomes = join_all(names.iter().map(|name| async move {
        (name, search_one(store, name, query, top_k).await)
    }))
    .await;

    let mut aggregated = AggregatedSearch::default();
    let mut metrics = BTreeSet::new();
    for (name, outcome) in outcomes {
        match outcome {
            Ok((metric, hits)) => {
                metrics.insert(metric.as_str());
                aggregated.hits.extend(hits);
            }
            Err(e) => {
                tracing::warn!("Error searching in {}: {}", name, e);
                aggregated.failures.push(CollectionFailure {
                    collection: name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    if metrics.len() > 1 {
        tracing::warn!(
            "Collections use different distance metrics ({}); merged scores may not be comparable",
            metrics.into_iter().collect::<Vec<_>>().join(", ")
        );
    }

    // Stable, so equal scores keep collection order
    aggregated.hits.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    aggregated.hits.truncate(top_k);
    Ok(aggregated)
}
