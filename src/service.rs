//! High-level search service.
//!
//! Owns both stores, wires the refresh coordinator, and exposes the query
//! surface and the single-file change listener used by watcher plumbing.
//!
//! ## Usage
//!
//! ```ignore
//! use symdex::SearchService;
//!
//! let service = SearchService::new(config, resolver)?;
//! let (deleted, indexed) = service.refresh().await?;
//! let hits = service.search_classes("RPC", 10).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;

use crate::config::SymdexConfig;
use crate::error::Result;
use crate::error::SymdexErr;
use crate::extract::SourceResolver;
use crate::extract::SymbolExtractor;
use crate::refresh;
use crate::refresh::RefreshCoordinator;
use crate::search::TextIndex;
use crate::storage::SqliteStore;
use crate::storage::SymbolStore;
use crate::types::FqnKey;
use crate::types::FqnSymbol;
use crate::vfs::file_uri;

/// Facade over the search-and-index subsystem.
pub struct SearchService {
    store: Arc<SymbolStore>,
    index: Arc<TextIndex>,
    extractor: Arc<SymbolExtractor>,
    coordinator: RefreshCoordinator,
    /// Shared job pool; listener work queues here alongside refresh jobs.
    jobs: Arc<Semaphore>,
}

impl SearchService {
    /// Open both stores under the configured cache directory.
    pub fn new(config: SymdexConfig, resolver: Arc<dyn SourceResolver>) -> Result<Self> {
        config.indexing.validate()?;

        let db = Arc::new(SqliteStore::open(&config.sql_dir().join("db.sqlite3"))?);
        let store = Arc::new(SymbolStore::new(db));
        let index = Arc::new(TextIndex::open(
            &config.index_dir(),
            config.indexing.writer_heap_mb as usize,
        )?);
        let extractor = Arc::new(SymbolExtractor::new(resolver));
        let jobs = Arc::new(Semaphore::new(config.indexing.parallelism()));

        let coordinator = RefreshCoordinator::new(
            config.clone(),
            store.clone(),
            index.clone(),
            extractor.clone(),
            jobs.clone(),
        );

        tracing::info!(cache_dir = %config.cache_dir.display(), "search service initialized");
        Ok(Self {
            store,
            index,
            extractor,
            coordinator,
            jobs,
        })
    }

    /// Reconcile the stores with the filesystem.
    ///
    /// Resolves to `(deleted, indexed)` counts. Safe to run while queries
    /// are in flight; they observe whatever is committed.
    pub async fn refresh(&self) -> Result<(usize, usize)> {
        self.coordinator.refresh().await
    }

    /// Fuzzy class search, hydrated from the relational store in ranking
    /// order.
    pub async fn search_classes(&self, query: &str, max: usize) -> Result<Vec<FqnSymbol>> {
        let index = self.index.clone();
        let query = query.to_string();
        let keys = spawn_blocking(move || index.search_classes(&query, max))
            .await
            .map_err(|e| SymdexErr::Index {
                cause: format!("search task failed: {e}"),
            })??;
        self.hydrate(keys).await
    }

    /// Fuzzy member search: the query splits on whitespace into terms that
    /// must all match. Fields are not indexed, so only methods come back.
    pub async fn search_classes_fields_methods(
        &self,
        query: &str,
        max: usize,
    ) -> Result<Vec<FqnSymbol>> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_string).collect();
        let index = self.index.clone();
        let keys = spawn_blocking(move || index.search_classes_methods(&terms, max))
            .await
            .map_err(|e| SymdexErr::Index {
                cause: format!("search task failed: {e}"),
            })??;
        self.hydrate(keys).await
    }

    /// Exact-FQN lookup.
    pub async fn find_unique(&self, fqn: &str) -> Result<Option<FqnSymbol>> {
        self.store.find(fqn).await
    }

    /// A class file appeared: extract and persist, then commit the index.
    pub async fn on_classfile_added(&self, path: &Path) -> Result<()> {
        let _permit = self.jobs.acquire().await.expect("pool closed");
        refresh::index_file(&self.store, &self.index, &self.extractor, path).await?;
        self.commit().await
    }

    /// A class file vanished: drop it from both stores, then commit.
    pub async fn on_classfile_removed(&self, path: &Path) -> Result<()> {
        let _permit = self.jobs.acquire().await.expect("pool closed");
        refresh::delete_batch(&self.store, &self.index, vec![file_uri(path)]).await?;
        self.commit().await
    }

    /// A class file changed: remove-then-reinsert, then commit.
    pub async fn on_classfile_changed(&self, path: &Path) -> Result<()> {
        let _permit = self.jobs.acquire().await.expect("pool closed");
        refresh::delete_batch(&self.store, &self.index, vec![file_uri(path)]).await?;
        refresh::index_file(&self.store, &self.index, &self.extractor, path).await?;
        self.commit().await
    }

    async fn commit(&self) -> Result<()> {
        let index = self.index.clone();
        spawn_blocking(move || index.commit())
            .await
            .map_err(|e| SymdexErr::Index {
                cause: format!("commit task failed: {e}"),
            })?
    }

    async fn hydrate(&self, keys: Vec<FqnKey>) -> Result<Vec<FqnSymbol>> {
        let fqns: Vec<String> = keys.into_iter().map(|k| k.fqn).collect();
        self.store.find_many(fqns).await
    }
}
