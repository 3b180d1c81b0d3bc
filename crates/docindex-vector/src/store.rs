//! On-disk layout and the atomic generation swap.
//!
//! ```text
//! <root>/
//!   CURRENT                  live generation number
//!   LOCK                     OS file lock serializing writers across processes
//!   generations/<n>/
//!     vectors.lance/         LanceDB database, table "vectors"
//!     metadata.json          slots + chunks for the same generation
//! ```
//!
//! A new generation is staged in full before `CURRENT` is replaced with a
//! rename. Readers only ever follow `CURRENT`, so they see the old pair or the
//! new pair and never a mix. Staged directories that never got committed are
//! removed on drop, or by `sweep` after a crash.
//!
//! Staging, commit and sweep must run while holding [`IndexStore::lock_exclusive`];
//! otherwise a sweep in one process can delete a generation another process is
//! about to commit.

use docindex_core::error::{Error, InvariantViolation, Result};
use docindex_core::{Chunk, ChunkId, MetadataStore};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::index::VectorIndex;
use crate::table::{append_vectors, count_vectors, create_vectors_table, open_db, vector_width};

pub const CURRENT_FILE: &str = "CURRENT";
pub const GENERATIONS_DIR: &str = "generations";
pub const VECTORS_DIR: &str = "vectors.lance";
pub const METADATA_FILE: &str = "metadata.json";
pub const LOCK_FILE: &str = "LOCK";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct MetadataRecord {
    format_version: u32,
    generation: u64,
    dim: usize,
    slots: Vec<ChunkId>,
    chunks: Vec<Chunk>,
}

/// The live generation, read through `CURRENT`.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub generation: u64,
    pub vector_count: usize,
    pub metadata: MetadataStore,
}

/// A fully written generation that is not yet live.
///
/// Dropping it without [`IndexStore::commit`] deletes its directory.
#[derive(Debug)]
pub struct StagedGeneration {
    generation: u64,
    dir: PathBuf,
    committed: bool,
}

impl StagedGeneration {
    pub fn generation(&self) -> u64 { self.generation }

    pub fn dir(&self) -> &Path { &self.dir }
}

impl Drop for StagedGeneration {
    fn drop(&mut self) {
        if self.committed { return; }
        debug!(generation = self.generation, dir = %self.dir.display(), "discarding uncommitted generation");
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %self.dir.display(), error = %e, "failed to remove staged generation");
            }
        }
    }
}

/// An OS lock on `<root>/LOCK`, released when dropped.
#[derive(Debug)]
pub struct IndexLock {
    _file: fs::File,
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn exists(&self) -> bool { self.root.join(CURRENT_FILE).is_file() }

    /// Exclusive lock for a whole load, stage, commit and sweep sequence.
    ///
    /// Creates the root if needed. Waits on the blocking pool while another
    /// process (or another handle in this one) holds the lock.
    pub async fn lock_exclusive(&self) -> Result<IndexLock> {
        fs::create_dir_all(&self.root).map_err(|e| Error::PersistFailure(format!("creating {}: {e}", self.root.display())))?;
        self.acquire(true)
            .await
            .map_err(|e| Error::PersistFailure(format!("locking {}: {e}", self.root.display())))
    }

    /// Shared lock for readers. `None` when there is no root to lock yet.
    pub async fn lock_shared(&self) -> Result<Option<IndexLock>> {
        if !self.root.is_dir() { return Ok(None); }
        self.acquire(false)
            .await
            .map(Some)
            .map_err(|e| Error::IndexNotFound { path: self.root.join(LOCK_FILE), reason: e.to_string() })
    }

    async fn acquire(&self, exclusive: bool) -> std::io::Result<IndexLock> {
        let path = self.root.join(LOCK_FILE);
        tokio::task::spawn_blocking(move || -> std::io::Result<IndexLock> {
            let file = fs::OpenOptions::new().create(true).truncate(false).write(true).open(&path)?;
            if exclusive { FileExt::lock_exclusive(&file)?; } else { FileExt::lock_shared(&file)?; }
            Ok(IndexLock { _file: file })
        })
        .await
        .map_err(std::io::Error::other)?
    }

    pub fn generation_dir(&self, generation: u64) -> PathBuf {
        self.root.join(GENERATIONS_DIR).join(generation.to_string())
    }

    pub fn current_generation(&self) -> Result<u64> {
        let path = self.root.join(CURRENT_FILE);
        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::IndexNotFound { path: path.clone(), reason: e.to_string() })?;
        raw.trim()
            .parse::<u64>()
            .map_err(|e| Error::CorruptIndex { path, detail: format!("generation pointer {:?}: {e}", raw.trim()) })
    }

    /// Load the live vector count and metadata, checking they still pair up.
    pub async fn load(&self) -> Result<LoadedIndex> {
        let generation = self.current_generation()?;
        let dir = self.generation_dir(generation);

        let meta_path = dir.join(METADATA_FILE);
        let bytes = fs::read(&meta_path)
            .map_err(|e| Error::IndexNotFound { path: meta_path.clone(), reason: e.to_string() })?;
        let record: MetadataRecord = serde_json::from_slice(&bytes)
            .map_err(|e| Error::CorruptIndex { path: meta_path.clone(), detail: e.to_string() })?;
        if record.format_version != FORMAT_VERSION {
            return Err(Error::CorruptIndex {
                path: meta_path,
                detail: format!("unsupported format version {}", record.format_version),
            });
        }
        let metadata = MetadataStore::from_parts(record.dim, record.slots, record.chunks)
            .map_err(|e| Error::CorruptIndex { path: meta_path.clone(), detail: e.to_string() })?;

        let vectors_path = dir.join(VECTORS_DIR);
        if !vectors_path.is_dir() {
            return Err(Error::IndexNotFound { path: vectors_path, reason: "vector table missing".to_string() });
        }
        let conn = open_db(&vectors_path)
            .await
            .map_err(|e| Error::IndexNotFound { path: vectors_path.clone(), reason: format!("{e:#}") })?;
        let vector_count = count_vectors(&conn)
            .await
            .map_err(|e| Error::IndexNotFound { path: vectors_path.clone(), reason: format!("{e:#}") })?;
        if vector_count != metadata.len() {
            let violation = InvariantViolation::SlotCountMismatch { slots: metadata.len(), vectors: vector_count };
            return Err(Error::CorruptIndex { path: dir, detail: violation.to_string() });
        }
        let width = vector_width(&conn)
            .await
            .map_err(|e| Error::CorruptIndex { path: vectors_path.clone(), detail: format!("{e:#}") })?;
        if width != metadata.dim() {
            return Err(Error::CorruptIndex {
                path: dir,
                detail: format!("vector table is {width} wide but metadata says {}", metadata.dim()),
            });
        }

        debug!(generation, vectors = vector_count, "loaded index");
        Ok(LoadedIndex { generation, vector_count, metadata })
    }

    /// Write `index` and `metadata` as a brand-new generation.
    pub async fn stage_rebuild(&self, index: &VectorIndex, metadata: &MetadataStore) -> Result<StagedGeneration> {
        check_pair(index.len(), index.dim(), metadata)?;
        let staged = self.reserve_generation()?;
        let vectors_path = staged.dir.join(VECTORS_DIR);
        let conn = open_db(&vectors_path).await.map_err(persist_err)?;
        create_vectors_table(&conn, index).await.map_err(persist_err)?;
        drop(conn);
        self.finish_stage(&staged, metadata)?;
        Ok(staged)
    }

    /// Stage a generation holding `base`'s vectors followed by `added`.
    ///
    /// The base table is copied file by file, so the live generation is never
    /// written to.
    pub async fn stage_append(&self, base: &LoadedIndex, added: &VectorIndex, metadata: &MetadataStore) -> Result<StagedGeneration> {
        check_pair(base.vector_count + added.len(), added.dim(), metadata)?;
        let staged = self.reserve_generation()?;
        let src = self.generation_dir(base.generation).join(VECTORS_DIR);
        let dst = staged.dir.join(VECTORS_DIR);
        copy_tree(&src, &dst).map_err(|e| Error::PersistFailure(format!("copying {}: {e}", src.display())))?;
        let conn = open_db(&dst).await.map_err(persist_err)?;
        append_vectors(&conn, added, base.vector_count).await.map_err(persist_err)?;
        drop(conn);
        self.finish_stage(&staged, metadata)?;
        Ok(staged)
    }

    /// Point `CURRENT` at `staged`. This rename is the commit point.
    pub fn commit(&self, mut staged: StagedGeneration) -> Result<u64> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root).map_err(|e| Error::PersistFailure(e.to_string()))?;
        writeln!(tmp, "{}", staged.generation).map_err(|e| Error::PersistFailure(e.to_string()))?;
        tmp.as_file().sync_all().map_err(|e| Error::PersistFailure(e.to_string()))?;
        tmp.persist(self.root.join(CURRENT_FILE)).map_err(|e| Error::PersistFailure(e.error.to_string()))?;
        // Live from here on; Drop must not remove it.
        staged.committed = true;
        if let Err(e) = sync_dir(&self.root) {
            warn!(root = %self.root.display(), error = %e, "directory sync after commit failed");
        }
        info!(generation = staged.generation, "committed generation");
        Ok(staged.generation)
    }

    /// Create an empty index of width `dim`. Returns `false` if one exists.
    pub async fn initialize(&self, dim: usize) -> Result<bool> {
        if self.exists() { return Ok(false); }
        if dim == 0 { return Err(Error::InvalidInput("index dimension must be at least 1".to_string())); }
        fs::create_dir_all(&self.root).map_err(|e| Error::PersistFailure(format!("creating {}: {e}", self.root.display())))?;
        let staged = self.stage_rebuild(&VectorIndex::new(dim), &MetadataStore::empty(dim)).await?;
        self.commit(staged)?;
        Ok(true)
    }

    /// Remove every generation other than the live one, plus stray temp files.
    ///
    /// Failures are logged and skipped. Returns how many entries went away.
    pub fn sweep(&self) -> Result<usize> {
        let live = self.current_generation()?;
        let mut removed = 0usize;
        if let Ok(entries) = fs::read_dir(self.root.join(GENERATIONS_DIR)) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if name.to_string_lossy().parse::<u64>().ok() == Some(live) { continue; }
                match fs::remove_dir_all(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to sweep generation"),
                }
            }
        }
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                if !entry.file_name().to_string_lossy().starts_with(".tmp") { continue; }
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to sweep temp file"),
                }
            }
        }
        if removed > 0 { debug!(removed, "swept stale index entries"); }
        Ok(removed)
    }

    /// Next unused generation number. Orphans from crashed runs count as used.
    fn next_generation(&self) -> u64 {
        let mut max = self.current_generation().unwrap_or(0);
        if let Ok(entries) = fs::read_dir(self.root.join(GENERATIONS_DIR)) {
            for entry in entries.flatten() {
                if let Ok(n) = entry.file_name().to_string_lossy().parse::<u64>() { max = max.max(n); }
            }
        }
        max + 1
    }

    /// Claim a fresh generation directory. `create_dir` fails on an existing
    /// directory, so two stagers never share one.
    fn reserve_generation(&self) -> Result<StagedGeneration> {
        let parent = self.root.join(GENERATIONS_DIR);
        fs::create_dir_all(&parent).map_err(|e| Error::PersistFailure(format!("creating {}: {e}", parent.display())))?;
        let mut generation = self.next_generation();
        loop {
            let dir = self.generation_dir(generation);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    debug!(generation, "staging generation");
                    return Ok(StagedGeneration { generation, dir, committed: false });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => generation += 1,
                Err(e) => return Err(Error::PersistFailure(format!("creating {}: {e}", dir.display()))),
            }
        }
    }

    fn finish_stage(&self, staged: &StagedGeneration, metadata: &MetadataStore) -> Result<()> {
        let record = MetadataRecord {
            format_version: FORMAT_VERSION,
            generation: staged.generation,
            dim: metadata.dim(),
            slots: metadata.slots().to_vec(),
            chunks: metadata.to_chunk_list(),
        };
        let json = serde_json::to_vec_pretty(&record).map_err(|e| Error::PersistFailure(e.to_string()))?;
        fs::write(staged.dir.join(METADATA_FILE), json).map_err(|e| Error::PersistFailure(e.to_string()))?;
        sync_tree(&staged.dir).map_err(|e| Error::PersistFailure(format!("syncing {}: {e}", staged.dir.display())))
    }
}

fn check_pair(vectors: usize, dim: usize, metadata: &MetadataStore) -> Result<()> {
    if vectors != metadata.len() {
        let violation = InvariantViolation::SlotCountMismatch { slots: metadata.len(), vectors };
        return Err(Error::PersistFailure(violation.to_string()));
    }
    if dim != metadata.dim() {
        return Err(Error::PersistFailure(format!("vector width {dim} does not match index width {}", metadata.dim())));
    }
    Ok(())
}

fn persist_err(e: anyhow::Error) -> Error {
    Error::PersistFailure(format!("{e:#}"))
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry.path().strip_prefix(src).map_err(std::io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// fsync every file under `dir`, then the directories themselves.
fn sync_tree(dir: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(dir).contents_first(true) {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_file() {
            fs::File::open(entry.path())?.sync_all()?;
        } else if entry.file_type().is_dir() {
            sync_dir(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
