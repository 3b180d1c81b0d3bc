//! Decides which chunks survive a deletion.
//!
//! Planning is a pure function of the criterion and the loaded store: it reads
//! nothing from disk and mutates nothing. Matching runs over every chunk.

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkId, DeletionCriterion, MetadataStore, RebuildPlan};

pub fn plan(criterion: &DeletionCriterion, store: &MetadataStore) -> Result<RebuildPlan> {
    match criterion {
        DeletionCriterion::BySource { name } => {
            let plan = keep_unless(store, |c| c.source == *name);
            if plan.retains_all(store) {
                return Err(Error::DocumentNotFound(name.clone()));
            }
            Ok(plan)
        }
        DeletionCriterion::BySourceAndPage { name, page } => {
            if !store.contains_source(name) {
                return Err(Error::DocumentNotFound(name.clone()));
            }
            let plan = keep_unless(store, |c| c.source == *name && c.page == *page);
            if plan.retains_all(store) {
                return Err(Error::PageNotFound { document: name.clone(), page: *page });
            }
            Ok(plan)
        }
        DeletionCriterion::ByContentSubstring { query } => {
            if query.is_empty() {
                return Err(Error::InvalidInput("content query must not be empty".to_string()));
            }
            let needle = query.to_lowercase();
            // Zero matches yields the unchanged plan; the caller treats it as a no-op.
            Ok(keep_unless(store, |c| c.content.to_lowercase().contains(&needle)))
        }
        DeletionCriterion::All => Ok(RebuildPlan::default()),
    }
}

fn keep_unless(store: &MetadataStore, matches: impl Fn(&Chunk) -> bool) -> RebuildPlan {
    let keep_ids: Vec<ChunkId> = store
        .chunks()
        .filter(|c| !matches(c))
        .map(|c| c.id.clone())
        .collect();
    RebuildPlan { keep_ids }
}
