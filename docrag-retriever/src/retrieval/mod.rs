//! Indexing and retrieval on top of a [`CollectionStore`](crate::storage::CollectionStore).
//!
//! - [`indexer`]: extract, chunk and write one file into a collection
//! - [`search`]: query one collection or all of them
//! - [`catalog`]: list, describe and delete collections
//! - [`context`]: render hits as a grounded answer context
//! - [`metadata`]: the per-chunk metadata schema

pub mod catalog;
pub mod context;
pub mod indexer;
pub mod metadata;
pub mod search;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::{
    CollectionListing, CollectionSummary, DocumentSummary, delete_collection, describe_collection,
    list_collections_with_counts,
};
pub use context::render_grounded_context;
pub use indexer::{DocumentIndexer, IndexReport, IndexRequest, SupersedeOutcome};
pub use metadata::{ChunkMetadata, RESERVED_METADATA_KEYS, ReservedKeyPolicy};
pub use search::{
    AggregatedSearch, CollectionFailure, DEFAULT_TOP_K, HitMetadata, SearchHit,
    search_all_collections, search_in_collection,
};
