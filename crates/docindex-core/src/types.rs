//! Domain types shared by the planner, the rebuilder and the store.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::error::InvariantViolation;

pub type ChunkId = String;

/// Pages per source document, ascending and de-duplicated.
pub type DocumentListing = BTreeMap<String, Vec<u32>>;

/// Identifier assigned to page `page` of `source` at ingestion time.
pub fn chunk_id(source: &str, page: u32) -> ChunkId {
    format!("{}:{}", source, page)
}

/// One page of one source document; the unit of storage and deletion.
///
/// - `id`: unique within a store and kept across rebuilds
/// - `source`: originating document (e.g. file name), compared exactly
/// - `page`: 1-indexed position within `source`
/// - `content`: the text that gets embedded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source: String,
    pub page: u32,
    pub content: String,
}

impl Chunk {
    pub fn new(source: impl Into<String>, page: u32, content: impl Into<String>) -> Self {
        let source = source.into();
        Self { id: chunk_id(&source, page), source, page, content: content.into() }
    }
}

/// Maps vector index positions to chunks.
///
/// `slots[i]` names the chunk whose vector sits at position `i` of the paired
/// vector index. Every slot resolves to a chunk, every chunk is named by exactly
/// one slot, and chunk ids are unique. The only ways to build a store check
/// these rules, so a value of this type always satisfies them.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataStore {
    dim: usize,
    slots: Vec<ChunkId>,
    chunks: HashMap<ChunkId, Chunk>,
}

impl MetadataStore {
    pub fn empty(dim: usize) -> Self {
        Self { dim, slots: Vec::new(), chunks: HashMap::new() }
    }

    /// Assemble a store from persisted parts, rejecting any broken invariant.
    pub fn from_parts(dim: usize, slots: Vec<ChunkId>, chunks: Vec<Chunk>) -> Result<Self, InvariantViolation> {
        let mut by_id = HashMap::with_capacity(chunks.len());
        for chunk in chunks {
            if by_id.contains_key(&chunk.id) {
                return Err(InvariantViolation::DuplicateChunk(chunk.id));
            }
            by_id.insert(chunk.id.clone(), chunk);
        }
        let mut seen = HashSet::with_capacity(slots.len());
        for (slot, id) in slots.iter().enumerate() {
            if !by_id.contains_key(id) {
                return Err(InvariantViolation::DanglingSlot { slot, id: id.clone() });
            }
            if !seen.insert(id.as_str()) {
                return Err(InvariantViolation::DuplicateSlot(id.clone()));
            }
        }
        if let Some(orphan) = by_id.keys().find(|id| !seen.contains(id.as_str())) {
            return Err(InvariantViolation::OrphanChunk(orphan.clone()));
        }
        Ok(Self { dim, slots, chunks: by_id })
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn slots(&self) -> &[ChunkId] { &self.slots }

    pub fn len(&self) -> usize { self.slots.len() }

    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    pub fn chunk(&self, id: &str) -> Option<&Chunk> { self.chunks.get(id) }

    /// Chunks in slot order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> + '_ {
        self.slots.iter().filter_map(move |id| self.chunks.get(id))
    }

    pub fn contains_source(&self, source: &str) -> bool {
        self.chunks.values().any(|c| c.source == source)
    }

    /// A new store holding only `keep_ids`, in that order.
    ///
    /// Ids that are not present, or repeat, are rejected.
    pub fn retain(&self, keep_ids: &[ChunkId]) -> Result<Self, InvariantViolation> {
        let chunks = keep_ids
            .iter()
            .enumerate()
            .map(|(slot, id)| {
                self.chunks
                    .get(id)
                    .cloned()
                    .ok_or_else(|| InvariantViolation::DanglingSlot { slot, id: id.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_parts(self.dim, keep_ids.to_vec(), chunks)
    }

    /// A new store with `added` occupying the slots after the existing ones.
    pub fn appended(&self, added: Vec<Chunk>) -> Result<Self, InvariantViolation> {
        let mut slots = self.slots.clone();
        slots.extend(added.iter().map(|c| c.id.clone()));
        let mut chunks: Vec<Chunk> = self.chunks().cloned().collect();
        chunks.extend(added);
        Self::from_parts(self.dim, slots, chunks)
    }

    /// Chunks in slot order, for serialization.
    pub fn to_chunk_list(&self) -> Vec<Chunk> {
        self.chunks().cloned().collect()
    }
}

/// What to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeletionCriterion {
    /// Every page of one source document.
    BySource { name: String },
    /// One page of one source document.
    BySourceAndPage { name: String, page: u32 },
    /// Every chunk whose content contains `query`, ignoring case.
    ByContentSubstring { query: String },
    All,
}

impl fmt::Display for DeletionCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BySource { name } => write!(f, "source={name}"),
            Self::BySourceAndPage { name, page } => write!(f, "source={name} page={page}"),
            Self::ByContentSubstring { query } => write!(f, "content~{query:?}"),
            Self::All => f.write_str("all"),
        }
    }
}

/// The slots that survive a deletion, in their original relative order.
///
/// An empty plan means "delete everything".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RebuildPlan {
    pub keep_ids: Vec<ChunkId>,
}

impl RebuildPlan {
    pub fn keep_ids(&self) -> &[ChunkId] { &self.keep_ids }

    /// Whether applying the plan to `store` would leave it unchanged.
    pub fn retains_all(&self, store: &MetadataStore) -> bool {
        self.keep_ids.len() == store.len()
    }

    pub fn removed_count(&self, store: &MetadataStore) -> usize {
        store.len().saturating_sub(self.keep_ids.len())
    }
}

/// Counts reported after every operation.
///
/// `total_pages` and `index_size` are both the slot count and always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub total_pages: usize,
    pub index_size: usize,
}

/// Body of `DELETE /documents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteBySourceRequest {
    pub filename: String,
}

/// Body of `DELETE /documents/page`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePageRequest {
    pub filename: String,
    pub page_number: u32,
}

/// Body of `DELETE /documents/content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteContentRequest {
    pub content_query: String,
}

impl From<DeleteBySourceRequest> for DeletionCriterion {
    fn from(req: DeleteBySourceRequest) -> Self {
        Self::BySource { name: req.filename }
    }
}

impl From<DeletePageRequest> for DeletionCriterion {
    fn from(req: DeletePageRequest) -> Self {
        Self::BySourceAndPage { name: req.filename, page: req.page_number }
    }
}

impl From<DeleteContentRequest> for DeletionCriterion {
    fn from(req: DeleteContentRequest) -> Self {
        Self::ByContentSubstring { query: req.content_query }
    }
}
