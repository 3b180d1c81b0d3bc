use docindex_core::error::{Error, ErrorClass};
use docindex_core::planner::plan;
use docindex_core::stats::{get_statistics, list_documents};
use docindex_core::types::{Chunk, DeletionCriterion, MetadataStore};

fn store_of(pages: &[(&str, u32, &str)]) -> MetadataStore {
    let chunks: Vec<Chunk> = pages.iter().map(|(s, p, c)| Chunk::new(*s, *p, *c)).collect();
    let slots = chunks.iter().map(|c| c.id.clone()).collect();
    MetadataStore::from_parts(8, slots, chunks).expect("valid store")
}

fn sample_store() -> MetadataStore {
    store_of(&[
        ("A.pdf", 1, "alpha one"),
        ("B.pdf", 1, "bravo one"),
        ("A.pdf", 2, "alpha two"),
        ("A.pdf", 3, "This section is Confidential."),
        ("B.pdf", 2, "bravo two"),
    ])
}

#[test]
fn by_source_keeps_other_documents_in_slot_order() {
    let store = sample_store();
    let p = plan(&DeletionCriterion::BySource { name: "A.pdf".into() }, &store).expect("plan");
    assert_eq!(p.keep_ids, vec!["B.pdf:1".to_string(), "B.pdf:2".to_string()]);
    assert_eq!(p.removed_count(&store), 3);
}

#[test]
fn by_source_is_case_sensitive_and_fails_when_nothing_matches() {
    let store = sample_store();
    let err = plan(&DeletionCriterion::BySource { name: "a.pdf".into() }, &store).unwrap_err();
    assert!(matches!(err, Error::DocumentNotFound(ref n) if n == "a.pdf"));
    assert_eq!(err.class(), ErrorClass::NoMatch);
}

#[test]
fn by_source_and_page_removes_exactly_one_chunk() {
    let store = sample_store();
    let p = plan(&DeletionCriterion::BySourceAndPage { name: "B.pdf".into(), page: 1 }, &store).expect("plan");
    assert_eq!(p.keep_ids.len(), 4);
    assert!(!p.keep_ids.contains(&"B.pdf:1".to_string()));
    assert_eq!(p.keep_ids[0], "A.pdf:1");
}

#[test]
fn by_source_and_page_distinguishes_missing_document_from_missing_page() {
    let store = sample_store();
    let missing_doc = plan(&DeletionCriterion::BySourceAndPage { name: "C.pdf".into(), page: 1 }, &store).unwrap_err();
    assert!(matches!(missing_doc, Error::DocumentNotFound(_)));

    let missing_page = plan(&DeletionCriterion::BySourceAndPage { name: "B.pdf".into(), page: 99 }, &store).unwrap_err();
    assert!(matches!(missing_page, Error::PageNotFound { ref document, page: 99 } if document == "B.pdf"));
}

#[test]
fn by_content_matches_case_insensitively() {
    let store = sample_store();
    let p = plan(&DeletionCriterion::ByContentSubstring { query: "confidential".into() }, &store).expect("plan");
    assert_eq!(p.removed_count(&store), 1);
    assert!(!p.keep_ids.contains(&"A.pdf:3".to_string()));

    let p = plan(&DeletionCriterion::ByContentSubstring { query: "ALPHA".into() }, &store).expect("plan");
    assert_eq!(p.keep_ids, vec!["B.pdf:1".to_string(), "A.pdf:3".to_string(), "B.pdf:2".to_string()]);
}

#[test]
fn by_content_without_matches_is_an_unchanged_plan() {
    let store = sample_store();
    let p = plan(&DeletionCriterion::ByContentSubstring { query: "zulu".into() }, &store).expect("no-op plan");
    assert!(p.retains_all(&store));
    assert_eq!(p.keep_ids, store.slots().to_vec());
}

#[test]
fn by_content_rejects_empty_query() {
    let store = sample_store();
    let err = plan(&DeletionCriterion::ByContentSubstring { query: String::new() }, &store).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Input);
}

#[test]
fn all_plans_an_empty_index() {
    let store = sample_store();
    let p = plan(&DeletionCriterion::All, &store).expect("plan");
    assert!(p.keep_ids.is_empty());
    assert_eq!(p.removed_count(&store), store.len());
}

#[test]
fn planning_does_not_touch_the_store() {
    let store = sample_store();
    let before = store.clone();
    let _ = plan(&DeletionCriterion::BySource { name: "A.pdf".into() }, &store);
    let _ = plan(&DeletionCriterion::All, &store);
    assert_eq!(store, before);
}

#[test]
fn listing_is_sorted_and_deduplicated() {
    let store = sample_store();
    let listing = list_documents(&store);
    assert_eq!(listing.get("A.pdf"), Some(&vec![1, 2, 3]));
    assert_eq!(listing.get("B.pdf"), Some(&vec![1, 2]));
    assert_eq!(listing.len(), 2);
}

#[test]
fn statistics_count_documents_and_slots() {
    let stats = get_statistics(&sample_store());
    assert_eq!(stats.total_documents, 2);
    assert_eq!(stats.total_pages, 5);
    assert_eq!(stats.index_size, stats.total_pages);

    let empty = get_statistics(&MetadataStore::empty(8));
    assert_eq!((empty.total_documents, empty.total_pages, empty.index_size), (0, 0, 0));
}
