//! SQLite implementation of the collection store.
//!
//! Records live in a single SQLite database. Documents are embedded through an
//! [`EmbeddingProvider`] when they are added and query texts when a collection
//! is searched; ranking is a full scan with distances computed in memory.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE collections (
//!     name TEXT PRIMARY KEY,
//!     description TEXT NOT NULL,
//!     created_at TEXT NOT NULL,        -- RFC 3339
//!     distance TEXT NOT NULL,          -- cosine | l2 | ip
//!     embedding_model TEXT,            -- provider that embedded the records
//!     dimension INTEGER                -- NULL until the first write
//! );
//!
//! CREATE TABLE records (
//!     seq INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
//!     collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
//!     id TEXT NOT NULL,
//!     document TEXT NOT NULL,
//!     metadata TEXT NOT NULL,          -- JSON object of scalar values
//!     embedding BLOB NOT NULL,         -- f16 vector
//!     UNIQUE(collection, id)
//! );
//! ```
//!
//! A collection remembers the embedding model and dimension of its first
//! write. Adding to or querying it with a different provider fails with
//! [`StoreError::InvalidRequest`] instead of silently comparing incompatible
//! vectors.

use super::{
    AddBatch, CollectionHandle, CollectionMetadata, CollectionStore, GetRequest, GetResult,
    Include, Metadata, MetadataValue, QueryRequest, QueryResult, StoreError, StoreResult,
    WhereFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docrag_embed::EmbeddingProvider;
use half::f16;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

type SqlQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                StoreError::unavailable(err.to_string())
            }
            sqlx::Error::Io(_) => StoreError::unavailable(err.to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::invalid_request(err.to_string())
            }
            other => StoreError::backend(other),
        }
    }
}

/// Collection store backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("embedder", &self.embedder.provider_name())
            .finish()
    }
}

impl SqliteStore {
    /// Open (creating if needed) a database file.
    pub async fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let pool = SqlitePoolOptions::new()
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(path)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
                    .busy_timeout(std::time::Duration::from_secs(5))
                    .foreign_keys(true)
                    .create_if_missing(true),
            )
            .await?;
        tracing::debug!("Opened collection store at {}", path.display());
        Self::new_with_pool(pool, embedder).await
    }

    /// Open a private in-memory database, used by tests.
    pub async fn open_memory(embedder: Arc<dyn EmbeddingProvider>) -> StoreResult<Self> {
        // Every connection to :memory: is its own database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true))
            .await?;
        Self::new_with_pool(pool, embedder).await
    }

    async fn new_with_pool(
        pool: SqlitePool,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> StoreResult<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool, embedder })
    }

    async fn create_tables(pool: &SqlitePool) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL,
                distance TEXT NOT NULL,
                embedding_model TEXT,
                dimension INTEGER
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                document TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                CONSTRAINT unique_record UNIQUE(collection, id),
                FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection)")
            .execute(pool)
            .await?;

        Ok(())
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    fn handle(&self, name: String, metadata: CollectionMetadata) -> SqliteCollection {
        SqliteCollection {
            name,
            metadata,
            pool: self.pool.clone(),
            embedder: Arc::clone(&self.embedder),
        }
    }
}

#[async_trait]
impl CollectionStore for SqliteStore {
    type Handle = SqliteCollection;

    async fn heartbeat(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn get_collection(&self, name: &str) -> StoreResult<SqliteCollection> {
        let row = sqlx::query(
            "SELECT description, created_at, distance FROM collections WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            collection: name.to_string(),
        })?;

        let created_at: String = row.get("created_at");
        let distance: String = row.get("distance");
        let metadata = CollectionMetadata {
            description: row.get("description"),
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(StoreError::backend)?
                .with_timezone(&Utc),
            distance: distance.parse()?,
        };
        Ok(self.handle(name.to_string(), metadata))
    }

    async fn create_collection(
        &self,
        name: &str,
        metadata: CollectionMetadata,
    ) -> StoreResult<SqliteCollection> {
        if name.trim().is_empty() {
            return Err(StoreError::invalid_request("collection name must not be empty"));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO collections (name, description, created_at, distance)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(&metadata.description)
        .bind(metadata.created_at.to_rfc3339())
        .bind(metadata.distance.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                collection: name.to_string(),
            });
        }

        tracing::debug!("Created collection {} ({})", name, metadata.distance);
        Ok(self.handle(name.to_string(), metadata))
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM collections WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Handle to one collection of a [`SqliteStore`].
#[derive(Clone)]
pub struct SqliteCollection {
    name: String,
    metadata: CollectionMetadata,
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for SqliteCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCollection")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl SqliteCollection {
    /// Append `AND json_extract(...) = ?` clauses for every filter condition.
    fn filter_clause(filter: Option<&WhereFilter>) -> StoreResult<String> {
        let mut sql = String::new();
        for (key, _) in filter.map(|f| f.conditions()).unwrap_or_default() {
            if key.contains('"') {
                return Err(StoreError::invalid_request(format!(
                    "metadata key {key:?} cannot be filtered on"
                )));
            }
            sql.push_str(" AND json_extract(metadata, ?) = ?");
        }
        Ok(sql)
    }

    fn bind_filter<'q>(mut query: SqlQuery<'q>, filter: Option<&'q WhereFilter>) -> SqlQuery<'q> {
        for (key, value) in filter.map(|f| f.conditions()).unwrap_or_default() {
            query = query.bind(format!("$.\"{key}\""));
            query = match value {
                MetadataValue::Str(s) => query.bind(s.as_str()),
                MetadataValue::Int(i) => query.bind(*i),
                MetadataValue::Float(x) => query.bind(*x),
                // json_extract yields 1/0 for JSON booleans
                MetadataValue::Bool(b) => query.bind(i64::from(*b)),
            };
        }
        query
    }

    /// Check the provider against the one that embedded this collection's records.
    async fn check_embedding_space(&self) -> StoreResult<()> {
        let row = sqlx::query(
            "SELECT embedding_model, dimension FROM collections WHERE name = ?1",
        )
        .bind(&self.name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            collection: self.name.clone(),
        })?;

        let model: Option<String> = row.get("embedding_model");
        let dimension: Option<i64> = row.get("dimension");
        if let (Some(model), Some(dimension)) = (model, dimension) {
            let current = self.embedder.provider_name();
            let current_dim = self.embedder.embedding_dimension() as i64;
            if model != current || dimension != current_dim {
                return Err(StoreError::invalid_request(format!(
                    "collection '{}' was embedded with {} ({} dimensions), store uses {} ({} dimensions)",
                    self.name, model, dimension, current, current_dim
                )));
            }
        }
        Ok(())
    }

    fn decode_metadata(json: &str) -> StoreResult<Metadata> {
        serde_json::from_str(json).map_err(StoreError::backend)
    }
}

#[async_trait]
impl CollectionHandle for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> &CollectionMetadata {
        &self.metadata
    }

    async fn count(&self) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?1")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn get(&self, request: GetRequest) -> StoreResult<GetResult> {
        let sql = format!(
            "SELECT id, document, metadata FROM records WHERE collection = ?{} ORDER BY seq LIMIT ?",
            Self::filter_clause(request.filter.as_ref())?
        );
        let query = sqlx::query(&sql).bind(&self.name);
        let query = Self::bind_filter(query, request.filter.as_ref());
        let limit = request.limit.map(|l| l as i64).unwrap_or(-1);
        let rows = query.bind(limit).fetch_all(&self.pool).await?;

        let with_documents = request.includes(Include::Documents);
        let with_metadatas = request.includes(Include::Metadatas);
        let mut result = GetResult {
            ids: Vec::with_capacity(rows.len()),
            documents: with_documents.then(Vec::new),
            metadatas: with_metadatas.then(Vec::new),
        };

        for row in rows {
            result.ids.push(row.get("id"));
            if let Some(documents) = result.documents.as_mut() {
                documents.push(row.get("document"));
            }
            if let Some(metadatas) = result.metadatas.as_mut() {
                let json: String = row.get("metadata");
                metadatas.push(Self::decode_metadata(&json)?);
            }
        }
        Ok(result)
    }

    async fn add(&self, batch: AddBatch) -> StoreResult<()> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }
        self.check_embedding_space().await?;

        let embeddings = self
            .embedder
            .embed_texts(&batch.documents)
            .await
            .map_err(StoreError::backend)?;
        if embeddings.len() != batch.len() {
            return Err(StoreError::backend(format!(
                "embedder returned {} vectors for {} documents",
                embeddings.len(),
                batch.len()
            )));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE collections SET embedding_model = ?1, dimension = ?2
            WHERE name = ?3 AND dimension IS NULL
            "#,
        )
        .bind(self.embedder.provider_name())
        .bind(self.embedder.embedding_dimension() as i64)
        .bind(&self.name)
        .execute(&mut *tx)
        .await?;

        for (((id, document), metadata), embedding) in batch
            .ids
            .iter()
            .zip(&batch.documents)
            .zip(&batch.metadatas)
            .zip(&embeddings.embeddings)
        {
            let metadata_json = serde_json::to_string(metadata).map_err(StoreError::backend)?;
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, document, metadata, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&self.name)
            .bind(id)
            .bind(document)
            .bind(metadata_json)
            .bind(bytemuck::cast_slice::<f16, u8>(embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!("Added {} records to {}", batch.len(), self.name);
        Ok(())
    }

    async fn delete(&self, filter: WhereFilter) -> StoreResult<usize> {
        if filter.is_empty() {
            return Err(StoreError::invalid_request(
                "delete requires at least one filter condition",
            ));
        }
        let sql = format!(
            "DELETE FROM records WHERE collection = ?{}",
            Self::filter_clause(Some(&filter))?
        );
        let query = Self::bind_filter(sqlx::query(&sql).bind(&self.name), Some(&filter));
        let result = query.execute(&self.pool).await?;
        tracing::debug!(
            "Deleted {} records from {}",
            result.rows_affected(),
            self.name
        );
        Ok(result.rows_affected() as usize)
    }

    async fn query(&self, request: QueryRequest) -> StoreResult<QueryResult> {
        let mut result = QueryResult::default();
        if request.query_texts.is_empty() {
            return Ok(result);
        }
        self.check_embedding_space().await?;

        let queries = self
            .embedder
            .embed_texts(&request.query_texts)
            .await
            .map_err(StoreError::backend)?;

        let rows = sqlx::query(
            "SELECT id, document, metadata, embedding FROM records WHERE collection = ?1 ORDER BY seq",
        )
        .bind(&self.name)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let bytes: Vec<u8> = row.get("embedding");
            let embedding = decode_embedding(&bytes);
            let id: String = row.get("id");
            let document: String = row.get("document");
            let metadata: String = row.get("metadata");
            candidates.push((id, document, metadata, embedding));
        }

        for query in &queries.embeddings {
            let mut ranked: Vec<(usize, f32)> = candidates
                .iter()
                .enumerate()
                .map(|(i, c)| (i, self.metadata.distance.distance(query, &c.3)))
                .collect();
            // Stable: ties keep insertion order
            ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            ranked.truncate(request.n_results);

            let mut ids = Vec::with_capacity(ranked.len());
            let mut documents = Vec::with_capacity(ranked.len());
            let mut metadatas = Vec::with_capacity(ranked.len());
            let mut distances = Vec::with_capacity(ranked.len());
            for (i, distance) in ranked {
                let (id, document, metadata, _) = &candidates[i];
                ids.push(id.clone());
                documents.push(document.clone());
                metadatas.push(Self::decode_metadata(metadata)?);
                distances.push(distance);
            }
            result.ids.push(ids);
            result.documents.push(documents);
            result.metadatas.push(metadatas);
            result.distances.push(distances);
        }

        tracing::debug!(
            "Queried {} with {} texts over {} records",
            self.name,
            request.query_texts.len(),
            candidates.len()
        );
        Ok(result)
    }
}

/// Read an f16 blob written with `bytemuck::cast_slice`. Blobs carry no alignment guarantee.
fn decode_embedding(bytes: &[u8]) -> Vec<f16> {
    bytes
        .chunks_exact(2)
        .map(|pair| f16::from_ne_bytes([pair[0], pair[1]]))
        .collect()
}
