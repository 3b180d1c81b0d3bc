use std::collections::{BTreeMap, BTreeSet};

use crate::types::{DocumentListing, IndexStats, MetadataStore};

pub fn list_documents(store: &MetadataStore) -> DocumentListing {
    let mut pages: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
    for chunk in store.chunks() {
        pages.entry(chunk.source.clone()).or_default().insert(chunk.page);
    }
    pages.into_iter().map(|(source, set)| (source, set.into_iter().collect())).collect()
}

pub fn get_statistics(store: &MetadataStore) -> IndexStats {
    let sources: BTreeSet<&str> = store.chunks().map(|c| c.source.as_str()).collect();
    IndexStats { total_documents: sources.len(), total_pages: store.len(), index_size: store.len() }
}
