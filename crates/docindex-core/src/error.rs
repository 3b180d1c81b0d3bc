use std::path::PathBuf;

use thiserror::Error;

use crate::types::ChunkId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Index not found at {}: {reason}", .path.display())]
    IndexNotFound { path: PathBuf, reason: String },

    #[error("Corrupt index at {}: {detail}", .path.display())]
    CorruptIndex { path: PathBuf, detail: String },

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Page {page} not found in document: {document}")]
    PageNotFound { document: String, page: u32 },

    #[error("Document already indexed: {0}")]
    DocumentExists(String),

    #[error("Rebuild failed at chunk {chunk_id}: {reason}")]
    RebuildFailure { chunk_id: ChunkId, reason: String },

    #[error("Persist failed: {0}")]
    PersistFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse grouping of failures by the response they call for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Nothing matched the request; durable state is unchanged.
    NoMatch,
    /// The persisted index is missing, corrupt, or could not be written.
    Storage,
    /// The embedding capability failed or timed out; retrying may help.
    Embedding,
    /// The caller supplied something unusable.
    Input,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::DocumentNotFound(_) | Self::PageNotFound { .. } => ErrorClass::NoMatch,
            Self::IndexNotFound { .. } | Self::CorruptIndex { .. } | Self::PersistFailure(_) => ErrorClass::Storage,
            Self::RebuildFailure { .. } => ErrorClass::Embedding,
            Self::InvalidConfig(_) | Self::InvalidInput(_) | Self::DocumentExists(_) => ErrorClass::Input,
        }
    }

    pub fn is_no_match(&self) -> bool {
        self.class() == ErrorClass::NoMatch
    }
}

/// A loaded metadata store that breaks one of the slot/chunk invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("slot {slot} names unknown chunk '{id}'")]
    DanglingSlot { slot: usize, id: ChunkId },

    #[error("chunk id '{0}' is defined more than once")]
    DuplicateChunk(ChunkId),

    #[error("chunk '{0}' occupies more than one slot")]
    DuplicateSlot(ChunkId),

    #[error("chunk '{0}' is not referenced by any slot")]
    OrphanChunk(ChunkId),

    #[error("{slots} slots but {vectors} vectors")]
    SlotCountMismatch { slots: usize, vectors: usize },
}
