//! Re-embeds surviving chunks into a fresh vector index.
//!
//! The index keeps no recoverable copy of raw vectors that is cheaper to read
//! back than to recompute, so every kept chunk is embedded again. Output order
//! always follows the plan, whatever order the embed calls finish in.

use docindex_core::config::IndexSettings;
use docindex_core::error::{Error, Result};
use docindex_core::{Chunk, Embedder, MetadataStore, RebuildPlan};
use futures::{stream, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::index::VectorIndex;

const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct IndexRebuilder {
    embedder: Arc<dyn Embedder>,
    concurrency: usize,
    timeout: Duration,
    progress: bool,
}

impl IndexRebuilder {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder, concurrency: DEFAULT_CONCURRENCY, timeout: DEFAULT_TIMEOUT, progress: false }
    }

    pub fn from_settings(embedder: Arc<dyn Embedder>, settings: &IndexSettings) -> Self {
        Self::new(embedder)
            .with_concurrency(settings.embed_concurrency)
            .with_timeout(settings.embed_timeout())
            .with_progress(settings.progress)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Upper bound on a single embed call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    /// Build the index and metadata that `plan` leaves behind.
    ///
    /// Any failed chunk aborts the whole rebuild; nothing partial is returned.
    pub async fn rebuild(&self, plan: &RebuildPlan, store: &MetadataStore) -> Result<(VectorIndex, MetadataStore)> {
        let kept = store
            .retain(plan.keep_ids())
            .map_err(|e| Error::InvalidInput(format!("plan does not fit the store: {e}")))?;
        if kept.is_empty() {
            debug!("plan keeps nothing; producing empty index");
            return Ok((VectorIndex::new(store.dim()), kept));
        }
        let chunks: Vec<Chunk> = kept.to_chunk_list();
        let index = self.embed_chunks(&chunks, store.dim()).await?;
        Ok((index, kept))
    }

    /// Embed `chunks` in order into a new index of width `dim`.
    pub async fn embed_chunks(&self, chunks: &[Chunk], dim: usize) -> Result<VectorIndex> {
        info!(chunks = chunks.len(), embedder = self.embedder.embedder_id(), concurrency = self.concurrency, "re-embedding chunks");
        let pb = self.progress_bar(chunks.len());

        let calls = stream::iter(chunks.iter().cloned())
            .map(|chunk| self.embed_one(chunk, dim))
            .buffered(self.concurrency);
        let mut calls = std::pin::pin!(calls);

        let mut index = VectorIndex::with_capacity(dim, chunks.len());
        while let Some(vector) = calls.try_next().await? {
            index.push(vector)?;
            pb.inc(1);
        }
        pb.finish_and_clear();
        Ok(index)
    }

    async fn embed_one(&self, chunk: Chunk, dim: usize) -> Result<Vec<f32>> {
        let embedder = self.embedder.clone();
        let Chunk { id, content, .. } = chunk;
        let task = tokio::task::spawn_blocking(move || embedder.embed(&content));
        let vector = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                return Err(Error::RebuildFailure { chunk_id: id, reason: format!("embedding timed out after {:?}", self.timeout) })
            }
            Ok(Err(join)) => return Err(Error::RebuildFailure { chunk_id: id, reason: format!("embedding task failed: {join}") }),
            Ok(Ok(Err(e))) => return Err(Error::RebuildFailure { chunk_id: id, reason: format!("{e:#}") }),
            Ok(Ok(Ok(v))) => v,
        };
        if vector.len() != dim {
            return Err(Error::RebuildFailure {
                chunk_id: id,
                reason: format!("embedder returned {} values, index expects {dim}", vector.len()),
            });
        }
        Ok(vector)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress { return ProgressBar::hidden(); }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)") {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
