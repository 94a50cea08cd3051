//! Collection store abstraction for docrag-retriever
//!
//! The retrieval layer never talks to a database directly. It goes through two
//! narrow async traits, so the indexer and the aggregator can be exercised
//! against any backend, including failure-injecting wrappers in tests.
//!
//! ## Key Components
//!
//! - **CollectionStore**: enumerate, fetch, create and delete named collections
//! - **CollectionHandle**: count, get, add, delete and query records of one collection
//! - **Request/response types**: [`GetRequest`], [`AddBatch`], [`QueryRequest`] and friends
//! - **StoreError**: the store's own failure taxonomy
//!
//! ## Architecture
//!
//! ```text
//! DocumentIndexer ─┐
//!                  ├─ CollectionStore ── SqliteStore (concrete implementation)
//! search / catalog ┘        │
//!                    CollectionHandle ── SqliteCollection
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub mod sqlite_store;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by a collection store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or did not answer in time
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    /// No collection with this name exists
    #[error("Collection '{collection}' does not exist")]
    NotFound { collection: String },

    /// A collection with this name already exists
    #[error("Collection '{collection}' already exists")]
    AlreadyExists { collection: String },

    /// The request was malformed (mismatched batch lengths, duplicate ids, ...)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Any other backend failure
    #[error("Store backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StoreError {
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn backend<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Backend {
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A single metadata value. Serialized as the bare JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// False for NaN and infinite floats, which JSON cannot represent.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(x) => x.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Record metadata, keyed by field name.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Reject values that would not survive a round trip through the store.
pub fn validate_metadata(metadata: &Metadata) -> StoreResult<()> {
    if let Some((key, value)) = metadata.iter().find(|(_, value)| !value.is_finite()) {
        return Err(StoreError::invalid_request(format!(
            "metadata '{key}' is {value}; only finite numbers can be stored"
        )));
    }
    Ok(())
}

/// Conjunction of `key == value` conditions on record metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereFilter {
    conditions: Vec<(String, MetadataValue)>,
}

impl WhereFilter {
    /// Filter matching records whose `key` equals `value`.
    pub fn eq(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::default().and_eq(key, value)
    }

    /// Add another equality condition.
    pub fn and_eq(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, MetadataValue)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// Optional parts of a record returned by [`CollectionHandle::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Include {
    Documents,
    Metadatas,
}

/// Parameters for [`CollectionHandle::get`]. Ids are always returned.
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    pub filter: Option<WhereFilter>,
    pub include: Vec<Include>,
    pub limit: Option<usize>,
}

impl GetRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: WhereFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_include(mut self, include: Include) -> Self {
        if !self.include.contains(&include) {
            self.include.push(include);
        }
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn includes(&self, include: Include) -> bool {
        self.include.contains(&include)
    }
}

/// Records returned by [`CollectionHandle::get`], in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetResult {
    pub ids: Vec<String>,
    /// Present when [`Include::Documents`] was requested
    pub documents: Option<Vec<String>>,
    /// Present when [`Include::Metadatas`] was requested
    pub metadatas: Option<Vec<Metadata>>,
}

/// Records written by one [`CollectionHandle::add`] call. All three vectors are parallel.
#[derive(Debug, Clone, Default)]
pub struct AddBatch {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

impl AddBatch {
    pub fn push(&mut self, id: String, document: String, metadata: Metadata) {
        self.ids.push(id);
        self.documents.push(document);
        self.metadatas.push(metadata);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Check that the vectors line up, ids are unique within the batch and every metadata value is storable.
    pub fn validate(&self) -> StoreResult<()> {
        if self.documents.len() != self.ids.len() || self.metadatas.len() != self.ids.len() {
            return Err(StoreError::invalid_request(format!(
                "batch has {} ids, {} documents and {} metadatas",
                self.ids.len(),
                self.documents.len(),
                self.metadatas.len()
            )));
        }
        let mut seen = std::collections::HashSet::with_capacity(self.ids.len());
        for id in &self.ids {
            if !seen.insert(id.as_str()) {
                return Err(StoreError::invalid_request(format!(
                    "duplicate id '{id}' in batch"
                )));
            }
        }
        for metadata in &self.metadatas {
            validate_metadata(metadata)?;
        }
        Ok(())
    }
}

/// Parameters for [`CollectionHandle::query`].
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query_texts: Vec<String>,
    pub n_results: usize,
}

impl QueryRequest {
    pub fn single(query: impl Into<String>, n_results: usize) -> Self {
        Self {
            query_texts: vec![query.into()],
            n_results,
        }
    }
}

/// Nearest records per query text. Outer index is the query, inner is the rank (best first).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    pub documents: Vec<Vec<String>>,
    pub metadatas: Vec<Vec<Metadata>>,
    pub distances: Vec<Vec<f32>>,
}

/// Distance function a collection ranks by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`
    #[default]
    Cosine,
    /// Squared Euclidean distance
    L2,
    /// `1 - a·b`
    Ip,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Ip => "ip",
        }
    }

    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[half::f16], b: &[half::f16]) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        let mut l2 = 0.0f32;

        for (x, y) in a.iter().zip(b) {
            let (x, y) = (x.to_f32(), y.to_f32());
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
            l2 += (x - y) * (x - y);
        }

        match self {
            Self::Cosine => {
                let denom = norm_a.sqrt() * norm_b.sqrt();
                if denom == 0.0 { 1.0 } else { 1.0 - dot / denom }
            }
            Self::L2 => l2,
            Self::Ip => 1.0 - dot,
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" => Ok(Self::L2),
            "ip" => Ok(Self::Ip),
            other => Err(StoreError::invalid_request(format!(
                "unknown distance metric '{other}'"
            ))),
        }
    }
}

/// Collection-level metadata, fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub distance: DistanceMetric,
}

impl CollectionMetadata {
    /// Metadata for a collection created now, ranked by cosine distance.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            created_at: Utc::now(),
            distance: DistanceMetric::Cosine,
        }
    }

    pub fn with_distance(mut self, distance: DistanceMetric) -> Self {
        self.distance = distance;
        self
    }
}

/// Named collections of records.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    type Handle: CollectionHandle;

    /// Cheap round trip proving the store is reachable
    async fn heartbeat(&self) -> StoreResult<()>;

    /// Names of all collections, sorted
    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    /// Fetch a collection, failing with [`StoreError::NotFound`] when absent
    async fn get_collection(&self, name: &str) -> StoreResult<Self::Handle>;

    /// Create a collection, failing with [`StoreError::AlreadyExists`] when the name is taken
    async fn create_collection(
        &self,
        name: &str,
        metadata: CollectionMetadata,
    ) -> StoreResult<Self::Handle>;

    /// Delete a collection and all its records
    async fn delete_collection(&self, name: &str) -> StoreResult<()>;
}

/// Records of one collection.
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    fn name(&self) -> &str;

    fn metadata(&self) -> &CollectionMetadata;

    async fn count(&self) -> StoreResult<usize>;

    async fn get(&self, request: GetRequest) -> StoreResult<GetResult>;

    /// Write a batch atomically
    async fn add(&self, batch: AddBatch) -> StoreResult<()>;

    /// Delete records matching a non-empty filter, returning how many were removed
    async fn delete(&self, filter: WhereFilter) -> StoreResult<usize>;

    async fn query(&self, request: QueryRequest) -> StoreResult<QueryResult>;
}
