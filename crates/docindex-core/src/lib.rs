//! docindex-core
//!
//! Data model, error taxonomy, configuration and the pure parts of the
//! deletion engine: planning which chunks survive and reporting on a store.

#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod pages;
pub mod planner;
pub mod stats;
pub mod traits;
pub mod types;

pub use error::{Error, ErrorClass, Result};
pub use traits::Embedder;
pub use types::{Chunk, ChunkId, DeletionCriterion, DocumentListing, IndexStats, MetadataStore, RebuildPlan};
