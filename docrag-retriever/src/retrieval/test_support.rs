//! Failure-injecting store wrapper for unit tests.

use super::indexer::DocumentIndexer;
use crate::extract::{DEFAULT_HWP_COMMAND, ExtractorRegistry};
use crate::storage::sqlite_store::{SqliteCollection, SqliteStore};
use crate::storage::{
    AddBatch, CollectionHandle, CollectionMetadata, CollectionStore, GetRequest, GetResult,
    QueryRequest, QueryResult, StoreError, StoreResult, WhereFilter,
};
use async_trait::async_trait;
use docrag_context::tokenizer::CharTokenizerSource;
use docrag_context::{ChunkingConfig, TokenChunker};
use docrag_embed::HashingEmbedProvider;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Which calls fail. Read at call time, so changes apply to existing handles.
#[derive(Debug, Clone, Default)]
pub(crate) struct Faults {
    pub fail_list: bool,
    pub fail_get_collection: bool,
    /// Another writer creates the collection just before us
    pub create_races: bool,
    /// `get` on a collection fails (the supersede lookup)
    pub fail_lookup: bool,
    pub fail_add: bool,
    /// Collections whose `query` fails
    pub fail_query_for: Vec<String>,
}

fn injected() -> StoreError {
    StoreError::unavailable("injected fault")
}

#[derive(Debug)]
pub(crate) struct FaultyStore {
    inner: SqliteStore,
    faults: Arc<Mutex<Faults>>,
    add_calls: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub async fn new(faults: Faults) -> StoreResult<Self> {
        Ok(Self {
            inner: SqliteStore::open_memory(Arc::new(HashingEmbedProvider::default())).await?,
            faults: Arc::new(Mutex::new(faults)),
            add_calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock().unwrap() = faults;
    }

    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    pub fn add_calls(&self) -> &AtomicUsize {
        &self.add_calls
    }

    fn faults(&self) -> Faults {
        self.faults.lock().unwrap().clone()
    }

    fn wrap(&self, inner: SqliteCollection) -> FaultyCollection {
        FaultyCollection {
            inner,
            faults: Arc::clone(&self.faults),
            add_calls: Arc::clone(&self.add_calls),
        }
    }
}

#[async_trait]
impl CollectionStore for FaultyStore {
    type Handle = FaultyCollection;

    async fn heartbeat(&self) -> StoreResult<()> {
        self.inner.heartbeat().await
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        if self.faults().fail_list {
            return Err(injected());
        }
        self.inner.list_collections().await
    }

    async fn get_collection(&self, name: &str) -> StoreResult<FaultyCollection> {
        if self.faults().fail_get_collection {
            return Err(injected());
        }
        Ok(self.wrap(self.inner.get_collection(name).await?))
    }

    async fn create_collection(
        &self,
        name: &str,
        metadata: CollectionMetadata,
    ) -> StoreResult<FaultyCollection> {
        if self.faults().create_races {
            self.inner
                .create_collection(name, CollectionMetadata::new("created by the other writer"))
                .await?;
        }
        Ok(self.wrap(self.inner.create_collection(name, metadata).await?))
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        self.inner.delete_collection(name).await
    }
}

#[derive(Debug)]
pub(crate) struct FaultyCollection {
    inner: SqliteCollection,
    faults: Arc<Mutex<Faults>>,
    add_calls: Arc<AtomicUsize>,
}

impl FaultyCollection {
    fn faults(&self) -> Faults {
        self.faults.lock().unwrap().clone()
    }
}

#[async_trait]
impl CollectionHandle for FaultyCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn metadata(&self) -> &CollectionMetadata {
        self.inner.metadata()
    }

    async fn count(&self) -> StoreResult<usize> {
        self.inner.count().await
    }

    async fn get(&self, request: GetRequest) -> StoreResult<GetResult> {
        if self.faults().fail_lookup {
            return Err(injected());
        }
        self.inner.get(request).await
    }

    async fn add(&self, batch: AddBatch) -> StoreResult<()> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults().fail_add {
            return Err(injected());
        }
        self.inner.add(batch).await
    }

    async fn delete(&self, filter: WhereFilter) -> StoreResult<usize> {
        self.inner.delete(filter).await
    }

    async fn query(&self, request: QueryRequest) -> StoreResult<QueryResult> {
        if self
            .faults()
            .fail_query_for
            .iter()
            .any(|name| name == self.inner.name())
        {
            return Err(injected());
        }
        self.inner.query(request).await
    }
}

/// Indexer with a character tokenizer and the given window.
pub(crate) fn char_indexer(chunk_size: usize, overlap: usize) -> DocumentIndexer {
    let chunker = TokenChunker::new(
        Arc::new(CharTokenizerSource),
        ChunkingConfig::new(chunk_size, overlap),
    )
    .unwrap();
    DocumentIndexer::new(ExtractorRegistry::with_defaults(DEFAULT_HWP_COMMAND), chunker)
}
