use arrow_array::Int32Array;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};

use docindex_core::error::Error;
use docindex_core::{Chunk, MetadataStore};
use docindex_vector::schema::VECTORS_TABLE;
use docindex_vector::store::{GENERATIONS_DIR, METADATA_FILE, VECTORS_DIR};
use docindex_vector::table::{count_vectors, open_db};
use docindex_vector::{IndexStore, VectorIndex};

const DIM: usize = 4;

fn vector(seed: f32) -> Vec<f32> { vec![seed, seed + 1.0, seed + 2.0, seed + 3.0] }

fn three_chunks() -> (VectorIndex, MetadataStore) {
    let chunks = vec![Chunk::new("a.txt", 1, "one"), Chunk::new("a.txt", 2, "two"), Chunk::new("b.txt", 1, "three")];
    let slots = chunks.iter().map(|c| c.id.clone()).collect();
    let metadata = MetadataStore::from_parts(DIM, slots, chunks).expect("valid store");
    let mut index = VectorIndex::new(DIM);
    for i in 0..3 { index.push(vector(i as f32)).expect("push"); }
    (index, metadata)
}

#[tokio::test]
async fn initialize_then_load_empty() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = IndexStore::new(tmp.path());
    assert!(!store.exists());

    assert!(store.initialize(DIM).await?);
    assert!(store.exists());
    let loaded = store.load().await?;
    assert_eq!(loaded.vector_count, 0);
    assert!(loaded.metadata.is_empty());
    assert_eq!(loaded.metadata.dim(), DIM);

    assert!(!store.initialize(DIM).await?, "second initialize is a no-op");
    assert_eq!(store.current_generation()?, loaded.generation);
    Ok(())
}

#[tokio::test]
async fn commit_swaps_generation() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = IndexStore::new(tmp.path());
    store.initialize(DIM).await?;
    let first = store.current_generation()?;

    let (index, metadata) = three_chunks();
    let staged = store.stage_rebuild(&index, &metadata).await?;
    assert!(staged.dir().join(METADATA_FILE).is_file());
    assert!(staged.dir().join(VECTORS_DIR).is_dir());
    let generation = store.commit(staged)?;

    assert!(generation > first);
    let loaded = store.load().await?;
    assert_eq!(loaded.generation, generation);
    assert_eq!(loaded.vector_count, 3);
    assert_eq!(loaded.metadata, metadata);

    let conn = open_db(&store.generation_dir(generation).join(VECTORS_DIR)).await?;
    assert_eq!(count_vectors(&conn).await?, 3);
    Ok(())
}

#[tokio::test]
async fn interrupted_persist_leaves_previous_state() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = IndexStore::new(tmp.path());
    store.initialize(DIM).await?;
    let (index, metadata) = three_chunks();
    store.commit(store.stage_rebuild(&index, &metadata).await?)?;
    let before = store.load().await?;

    // Stage a smaller generation and "crash" before the pointer flip.
    let kept = metadata.retain(&metadata.slots()[..1].to_vec())?;
    let mut smaller = VectorIndex::new(DIM);
    smaller.push(vector(0.0))?;
    let staged = store.stage_rebuild(&smaller, &kept).await?;
    let orphan = staged.dir().to_path_buf();
    let orphan_generation = staged.generation();
    std::mem::forget(staged);

    let after = store.load().await?;
    assert_eq!(after.generation, before.generation);
    assert_eq!(after.vector_count, 3);
    assert_eq!(after.metadata, before.metadata);
    assert!(orphan.is_dir(), "crash leaves the staged directory behind");

    // A later stage never reuses the orphan's number.
    let next = store.stage_rebuild(&index, &metadata).await?;
    assert!(next.generation() > orphan_generation);
    drop(next);

    let removed = store.sweep()?;
    assert!(removed >= 1);
    assert!(!orphan.exists());
    let live = store.load().await?;
    assert_eq!(live.metadata, before.metadata);
    Ok(())
}

#[tokio::test]
async fn dropped_stage_is_cleaned_up() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = IndexStore::new(tmp.path());
    store.initialize(DIM).await?;

    let (index, metadata) = three_chunks();
    let staged = store.stage_rebuild(&index, &metadata).await?;
    let dir = staged.dir().to_path_buf();
    drop(staged);
    assert!(!dir.exists());
    assert_eq!(store.load().await?.vector_count, 0);
    Ok(())
}

#[tokio::test]
async fn sweep_keeps_only_live_generation() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = IndexStore::new(tmp.path());
    store.initialize(DIM).await?;
    let (index, metadata) = three_chunks();
    let live = store.commit(store.stage_rebuild(&index, &metadata).await?)?;

    store.sweep()?;
    let remaining: Vec<String> = std::fs::read_dir(tmp.path().join(GENERATIONS_DIR))?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    assert_eq!(remaining, vec![live.to_string()]);
    Ok(())
}

#[tokio::test]
async fn append_copies_base_and_extends() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = IndexStore::new(tmp.path());
    store.initialize(DIM).await?;
    let (index, metadata) = three_chunks();
    store.commit(store.stage_rebuild(&index, &metadata).await?)?;
    let base = store.load().await?;

    let extended = base.metadata.appended(vec![Chunk::new("c.txt", 1, "four")])?;
    let mut added = VectorIndex::new(DIM);
    added.push(vector(9.0))?;
    let generation = store.commit(store.stage_append(&base, &added, &extended).await?)?;

    let loaded = store.load().await?;
    assert_eq!(loaded.generation, generation);
    assert_eq!(loaded.vector_count, 4);
    assert_eq!(loaded.metadata.slots().last().map(String::as_str), Some("c.txt:1"));

    // The base generation's table is untouched by the append.
    let conn = open_db(&store.generation_dir(base.generation).join(VECTORS_DIR)).await?;
    assert_eq!(count_vectors(&conn).await?, 3);
    Ok(())
}

#[tokio::test]
async fn mismatched_pair_is_refused() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = IndexStore::new(tmp.path());
    store.initialize(DIM).await?;
    let generation = store.current_generation()?;

    let (_, metadata) = three_chunks();
    let mut short = VectorIndex::new(DIM);
    short.push(vector(1.0))?;
    let err = store.stage_rebuild(&short, &metadata).await.unwrap_err();
    assert!(matches!(err, Error::PersistFailure(_)), "{err}");
    assert_eq!(store.current_generation()?, generation);
    Ok(())
}

fn bulk(source: &str, pages: u32, seed: f32) -> (Vec<Chunk>, VectorIndex) {
    let chunks: Vec<Chunk> = (1..=pages).map(|p| Chunk::new(source, p, format!("{source} page {p}"))).collect();
    let mut index = VectorIndex::with_capacity(DIM, chunks.len());
    for p in 0..pages { index.push(vector(seed + p as f32)).expect("push"); }
    (chunks, index)
}

async fn stored_slots(store: &IndexStore, generation: u64) -> anyhow::Result<Vec<i32>> {
    let conn = open_db(&store.generation_dir(generation).join(VECTORS_DIR)).await?;
    let table = conn.open_table(VECTORS_TABLE).execute().await?;
    let mut stream = table.query().select(Select::columns(&["slot"])).execute().await?;
    let mut slots = Vec::new();
    while let Some(batch) = stream.try_next().await? {
        let column = batch
            .column_by_name("slot")
            .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
            .ok_or_else(|| anyhow::anyhow!("slot column missing"))?;
        slots.extend(column.values().iter().copied());
    }
    slots.sort_unstable();
    Ok(slots)
}

#[tokio::test]
async fn large_rebuild_and_append_span_several_batches() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = IndexStore::new(tmp.path());
    store.initialize(DIM).await?;

    let (chunks, index) = bulk("bulk.txt", 2500, 0.0);
    let slots = chunks.iter().map(|c| c.id.clone()).collect();
    let metadata = MetadataStore::from_parts(DIM, slots, chunks)?;
    store.commit(store.stage_rebuild(&index, &metadata).await?)?;
    let base = store.load().await?;
    assert_eq!(base.vector_count, 2500);

    // Starts mid-batch and crosses the next batch boundary.
    let (more, added) = bulk("more.txt", 1200, 5000.0);
    let extended = base.metadata.appended(more)?;
    let generation = store.commit(store.stage_append(&base, &added, &extended).await?)?;

    let loaded = store.load().await?;
    assert_eq!(loaded.vector_count, 3700);
    assert_eq!(loaded.metadata.len(), 3700);
    let conn = open_db(&store.generation_dir(generation).join(VECTORS_DIR)).await?;
    assert_eq!(count_vectors(&conn).await?, 3700);
    assert_eq!(stored_slots(&store, generation).await?, (0..3700).collect::<Vec<i32>>());
    Ok(())
}

#[tokio::test]
async fn width_mismatch_between_table_and_metadata_is_corrupt() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = IndexStore::new(tmp.path());
    store.initialize(DIM).await?;
    let generation = store.current_generation()?;

    let meta = store.generation_dir(generation).join(METADATA_FILE);
    let record = format!(r#"{{"format_version":1,"generation":{generation},"dim":{},"slots":[],"chunks":[]}}"#, DIM * 2);
    std::fs::write(&meta, record)?;

    let err = store.load().await.unwrap_err();
    assert!(matches!(err, Error::CorruptIndex { .. }), "{err}");
    assert!(err.to_string().contains("wide"), "{err}");
    Ok(())
}

#[tokio::test]
async fn exclusive_lock_excludes_other_handles() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let first = IndexStore::new(tmp.path());
    let second = IndexStore::new(tmp.path());
    first.initialize(DIM).await?;

    let held = first.lock_exclusive().await?;
    let waiting = async {
        let started = std::time::Instant::now();
        let _lock = second.lock_exclusive().await?;
        anyhow::Ok(started.elapsed())
    };
    let release = async {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        drop(held);
    };
    let (waited, ()) = tokio::join!(waiting, release);
    assert!(waited? >= std::time::Duration::from_millis(150), "second handle waited for the first");

    // Readers can share the lock.
    let a = first.lock_shared().await?;
    let b = second.lock_shared().await?;
    assert!(a.is_some() && b.is_some());
    Ok(())
}

#[test]
fn vector_width_is_checked_on_push() {
    let mut index = VectorIndex::new(DIM);
    let err = index.push(vec![1.0; DIM + 1]).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(index.is_empty());
}
