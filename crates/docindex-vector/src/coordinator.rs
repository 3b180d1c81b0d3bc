//! The single writer for one index root.
//!
//! Every mutation runs load, plan, rebuild and persist under an exclusive lock
//! and commits through the generation pointer. Reads take the lock shared and
//! load whatever generation is live. The in-process `RwLock` orders tasks on
//! one handle; the `<root>/LOCK` file lock orders handles and processes.

use docindex_core::config::IndexSettings;
use docindex_core::error::{Error, Result};
use docindex_core::planner::plan;
use docindex_core::stats::{get_statistics, list_documents};
use docindex_core::{Chunk, DeletionCriterion, DocumentListing, Embedder, IndexStats};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::rebuild::IndexRebuilder;
use crate::store::IndexStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Loading,
    Planning,
    Rebuilding,
    Persisting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loading => "loading",
            Self::Planning => "planning",
            Self::Rebuilding => "rebuilding",
            Self::Persisting => "persisting",
        })
    }
}

fn failed(phase: Phase) -> impl FnOnce(Error) -> Error {
    move |e| {
        warn!(%phase, error = %e, "operation failed");
        e
    }
}

pub struct DocumentIndex {
    store: IndexStore,
    rebuilder: IndexRebuilder,
    lock: RwLock<()>,
}

impl DocumentIndex {
    pub fn new(root: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self::with_rebuilder(root, IndexRebuilder::new(embedder))
    }

    pub fn from_settings(settings: &IndexSettings, embedder: Arc<dyn Embedder>) -> Self {
        Self::with_rebuilder(settings.root_path(), IndexRebuilder::from_settings(embedder, settings))
    }

    pub fn with_rebuilder(root: impl Into<PathBuf>, rebuilder: IndexRebuilder) -> Self {
        Self { store: IndexStore::new(root), rebuilder, lock: RwLock::new(()) }
    }

    pub fn store(&self) -> &IndexStore { &self.store }

    /// Create an empty index sized for the embedder, if none exists yet.
    pub async fn initialize(&self) -> Result<bool> {
        let _guard = self.lock.write().await;
        let _file_lock = self.store.lock_exclusive().await?;
        self.store.initialize(self.rebuilder.embedder().dim()).await
    }

    pub async fn delete_by_source(&self, name: &str) -> Result<IndexStats> {
        self.apply(&DeletionCriterion::BySource { name: name.to_string() }).await
    }

    pub async fn delete_by_source_and_page(&self, name: &str, page: u32) -> Result<IndexStats> {
        self.apply(&DeletionCriterion::BySourceAndPage { name: name.to_string(), page }).await
    }

    pub async fn delete_by_content(&self, query: &str) -> Result<IndexStats> {
        self.apply(&DeletionCriterion::ByContentSubstring { query: query.to_string() }).await
    }

    pub async fn delete_all(&self) -> Result<IndexStats> {
        self.apply(&DeletionCriterion::All).await
    }

    /// Remove whatever `criterion` matches and swap in the rebuilt index.
    ///
    /// On any error the previously live generation stays live and untouched.
    pub async fn apply(&self, criterion: &DeletionCriterion) -> Result<IndexStats> {
        let _guard = self.lock.write().await;
        let _file_lock = self.store.lock_exclusive().await.map_err(failed(Phase::Loading))?;
        info!(%criterion, "delete requested");

        let loaded = self.store.load().await.map_err(failed(Phase::Loading))?;
        let plan = plan(criterion, &loaded.metadata).map_err(failed(Phase::Planning))?;
        if plan.retains_all(&loaded.metadata) {
            info!(%criterion, "nothing matched; index unchanged");
            return Ok(get_statistics(&loaded.metadata));
        }
        debug!(keep = plan.keep_ids().len(), remove = plan.removed_count(&loaded.metadata), "planned rebuild");

        let (index, metadata) = self
            .rebuilder
            .rebuild(&plan, &loaded.metadata)
            .await
            .map_err(failed(Phase::Rebuilding))?;

        let staged = self.store.stage_rebuild(&index, &metadata).await.map_err(failed(Phase::Persisting))?;
        let generation = self.store.commit(staged).map_err(failed(Phase::Persisting))?;
        self.sweep();

        let stats = get_statistics(&metadata);
        info!(generation, pages = stats.total_pages, documents = stats.total_documents, "delete applied");
        Ok(stats)
    }

    /// Index `pages` of `source`, numbered from 1.
    ///
    /// Only the new pages are embedded; existing vectors are carried over.
    pub async fn add_document(&self, source: &str, pages: Vec<String>) -> Result<IndexStats> {
        if source.is_empty() {
            return Err(Error::InvalidInput("source name must not be empty".to_string()));
        }
        if pages.is_empty() {
            return Err(Error::InvalidInput(format!("document {source} has no pages")));
        }
        let _guard = self.lock.write().await;
        let _file_lock = self.store.lock_exclusive().await.map_err(failed(Phase::Loading))?;
        let dim = self.rebuilder.embedder().dim();
        if !self.store.exists() {
            info!(root = %self.store.root().display(), dim, "no index yet; initializing");
            self.store.initialize(dim).await.map_err(failed(Phase::Persisting))?;
        }

        let loaded = self.store.load().await.map_err(failed(Phase::Loading))?;
        if loaded.metadata.dim() != dim {
            return Err(Error::InvalidConfig(format!(
                "embedder produces {dim}-dimensional vectors but the index holds {}",
                loaded.metadata.dim()
            )));
        }
        if loaded.metadata.contains_source(source) {
            return Err(Error::DocumentExists(source.to_string()));
        }

        let chunks = pages
            .into_iter()
            .enumerate()
            .map(|(i, content)| -> Result<Chunk> {
                let page = u32::try_from(i + 1).map_err(|_| Error::InvalidInput(format!("document {source} has too many pages")))?;
                Ok(Chunk::new(source, page, content))
            })
            .collect::<Result<Vec<_>>>()?;
        let metadata = loaded
            .metadata
            .appended(chunks.clone())
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        let added = self.rebuilder.embed_chunks(&chunks, dim).await.map_err(failed(Phase::Rebuilding))?;
        let staged = self
            .store
            .stage_append(&loaded, &added, &metadata)
            .await
            .map_err(failed(Phase::Persisting))?;
        let generation = self.store.commit(staged).map_err(failed(Phase::Persisting))?;
        self.sweep();

        let stats = get_statistics(&metadata);
        info!(generation, source, pages = chunks.len(), "document added");
        Ok(stats)
    }

    pub async fn list_documents(&self) -> Result<DocumentListing> {
        let _guard = self.lock.read().await;
        let _file_lock = self.store.lock_shared().await?;
        let loaded = self.store.load().await?;
        Ok(list_documents(&loaded.metadata))
    }

    pub async fn get_statistics(&self) -> Result<IndexStats> {
        let _guard = self.lock.read().await;
        let _file_lock = self.store.lock_shared().await?;
        let loaded = self.store.load().await?;
        Ok(get_statistics(&loaded.metadata))
    }

    fn sweep(&self) {
        if let Err(e) = self.store.sweep() {
            warn!(error = %e, "sweeping old generations failed");
        }
    }
}
