//! Per-chunk metadata and the reserved-key check for caller-supplied fields.
//!
//! Every stored chunk carries eight fields owned by the indexer (see
//! [`RESERVED_METADATA_KEYS`]). Callers may attach their own fields, but those
//! never overwrite a reserved one: depending on the [`ReservedKeyPolicy`] a
//! collision is either rejected or the caller's key is renamed with a prefix.

use crate::error::{Result, RetrieverError};
use crate::storage::{Metadata, MetadataValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CHUNK_INDEX: &str = "chunk_index";
pub const TOTAL_CHUNKS: &str = "total_chunks";
pub const START_TOKEN: &str = "start_token";
pub const END_TOKEN: &str = "end_token";
pub const SOURCE: &str = "source";
pub const FILE_PATH: &str = "file_path";
pub const COLLECTION: &str = "collection";
pub const INDEXED_AT: &str = "indexed_at";

/// Fields written by the indexer on every chunk.
pub const RESERVED_METADATA_KEYS: [&str; 8] = [
    CHUNK_INDEX,
    TOTAL_CHUNKS,
    START_TOKEN,
    END_TOKEN,
    SOURCE,
    FILE_PATH,
    COLLECTION,
    INDEXED_AT,
];

/// Default prefix for [`ReservedKeyPolicy::Namespace`].
pub const DEFAULT_NAMESPACE_PREFIX: &str = "user_";

pub fn is_reserved(key: &str) -> bool {
    RESERVED_METADATA_KEYS.contains(&key)
}

/// What to do with caller metadata that uses a reserved key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservedKeyPolicy {
    /// Fail with [`RetrieverError::ReservedMetadataKey`]
    #[default]
    Reject,
    /// Rename the caller's key to `<prefix><key>`
    Namespace(String),
}

impl ReservedKeyPolicy {
    pub fn namespace() -> Self {
        Self::Namespace(DEFAULT_NAMESPACE_PREFIX.to_string())
    }

    /// Validate caller metadata, returning the fields safe to merge.
    pub fn apply(&self, user: Metadata) -> Result<Metadata> {
        match self {
            Self::Reject => {
                if let Some(key) = user.keys().find(|key| is_reserved(key)) {
                    return Err(RetrieverError::ReservedMetadataKey { key: key.clone() });
                }
                Ok(user)
            }
            Self::Namespace(prefix) => {
                let mut kept = Metadata::new();
                let mut renamed = Vec::new();
                for (key, value) in user {
                    if is_reserved(&key) {
                        renamed.push((format!("{prefix}{key}"), value, key));
                    } else {
                        kept.insert(key, value);
                    }
                }
                for (new_key, value, original) in renamed {
                    // The renamed key must not collide with a reserved key or another caller field
                    if is_reserved(&new_key) || kept.contains_key(&new_key) {
                        return Err(RetrieverError::ReservedMetadataKey { key: original });
                    }
                    tracing::debug!("Renamed reserved metadata key {} to {}", original, new_key);
                    kept.insert(new_key, value);
                }
                Ok(kept)
            }
        }
    }
}

/// Metadata stored with every chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMetadata {
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_token: usize,
    pub end_token: usize,
    /// Base name of the source file, the key used to supersede on re-index
    pub source: String,
    pub file_path: String,
    pub collection: String,
    pub indexed_at: DateTime<Utc>,
    /// Caller fields, already checked against the reserved keys
    pub extra: Metadata,
}

impl ChunkMetadata {
    /// Flatten into the store's map. Reserved fields win over `extra`.
    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = self.extra.clone();
        metadata.insert(CHUNK_INDEX.into(), self.chunk_index.into());
        metadata.insert(TOTAL_CHUNKS.into(), self.total_chunks.into());
        metadata.insert(START_TOKEN.into(), self.start_token.into());
        metadata.insert(END_TOKEN.into(), self.end_token.into());
        metadata.insert(SOURCE.into(), self.source.clone().into());
        metadata.insert(FILE_PATH.into(), self.file_path.clone().into());
        metadata.insert(COLLECTION.into(), self.collection.clone().into());
        metadata.insert(INDEXED_AT.into(), self.indexed_at.to_rfc3339().into());
        metadata
    }

    /// Rebuild from a stored map. `None` when a reserved field is missing or mistyped.
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        let int = |key: &str| {
            metadata
                .get(key)
                .and_then(MetadataValue::as_i64)
                .and_then(|v| usize::try_from(v).ok())
        };
        let string = |key: &str| metadata.get(key).and_then(MetadataValue::as_str);

        let indexed_at = DateTime::parse_from_rfc3339(string(INDEXED_AT)?)
            .ok()?
            .with_timezone(&Utc);
        let extra = metadata
            .iter()
            .filter(|(key, _)| !is_reserved(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Some(Self {
            chunk_index: int(CHUNK_INDEX)?,
            total_chunks: int(TOTAL_CHUNKS)?,
            start_token: int(START_TOKEN)?,
            end_token: int(END_TOKEN)?,
            source: string(SOURCE)?.to_string(),
            file_path: string(FILE_PATH)?.to_string(),
            collection: string(COLLECTION)?.to_string(),
            indexed_at,
            extra,
        })
    }
}

/// Record id `<collection>_<file>_<millis>_<index>`, unique within one indexing run.
pub fn chunk_record_id(collection: &str, file_name: &str, timestamp_millis: i64, index: usize) -> String {
    format!("{collection}_{file_name}_{timestamp_millis}_{index}")
}
