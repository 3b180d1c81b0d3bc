//! docindex-vector
//!
//! The stateful half of the deletion engine: a LanceDB-backed vector table
//! paired with JSON metadata per generation, the rebuilder that re-embeds
//! surviving chunks, and the coordinator that swaps generations atomically.

pub mod coordinator;
pub mod index;
pub mod rebuild;
pub mod schema;
pub mod store;
pub mod table;

pub use coordinator::DocumentIndex;
pub use index::VectorIndex;
pub use rebuild::IndexRebuilder;
pub use store::{IndexStore, LoadedIndex, StagedGeneration};
