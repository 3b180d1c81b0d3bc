//! LanceDB helpers for the per-generation vector table.
//!
//! A generation's table is written once, either from scratch or as a file-level
//! copy of the previous generation followed by appends. Rows are never updated
//! or deleted.

use anyhow::Result;
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator};
use arrow_schema::{DataType, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection};
use std::path::Path;
use std::sync::Arc;

use crate::index::VectorIndex;
use crate::schema::{vector_schema, VECTORS_TABLE};

const BATCH_SIZE: usize = 1000;

pub async fn open_db(path: &Path) -> Result<Connection> {
    Ok(connect(path.to_string_lossy().as_ref()).execute().await?)
}

/// Create the vectors table holding `index`, slots numbered from zero.
/// An empty index still creates the (empty) table.
pub async fn create_vectors_table(conn: &Connection, index: &VectorIndex) -> Result<()> {
    let schema = vector_schema(i32::try_from(index.dim())?);
    if index.is_empty() {
        conn.create_empty_table(VECTORS_TABLE, schema).execute().await?;
        return Ok(());
    }
    let batches = to_record_batches(index, 0, &schema)?;
    let reader = Box::new(RecordBatchIterator::new(batches.into_iter().map(Ok), schema));
    conn.create_table(VECTORS_TABLE, reader).execute().await?;
    Ok(())
}

/// Append `index` after the existing rows, slots numbered from `first_slot`.
pub async fn append_vectors(conn: &Connection, index: &VectorIndex, first_slot: usize) -> Result<()> {
    if index.is_empty() { return Ok(()); }
    let table = conn.open_table(VECTORS_TABLE).execute().await?;
    let schema = vector_schema(i32::try_from(index.dim())?);
    let batches = to_record_batches(index, first_slot, &schema)?;
    let reader = Box::new(RecordBatchIterator::new(batches.into_iter().map(Ok), schema));
    table.add(reader).execute().await?;
    Ok(())
}

pub async fn count_vectors(conn: &Connection) -> Result<usize> {
    let table = conn.open_table(VECTORS_TABLE).execute().await?;
    let mut total = 0usize;
    let mut stream = table.query().select(Select::columns(&["slot"])).execute().await?;
    while let Some(batch) = stream.try_next().await? { total += batch.num_rows(); }
    Ok(total)
}

/// Width of the `vector` column as stored in the table's schema.
pub async fn vector_width(conn: &Connection) -> Result<usize> {
    let table = conn.open_table(VECTORS_TABLE).execute().await?;
    let schema = table.schema().await?;
    match schema.field_with_name("vector")?.data_type() {
        DataType::FixedSizeList(_, width) => Ok(usize::try_from(*width)?),
        other => anyhow::bail!("vector column has type {other}, expected a fixed-size list"),
    }
}

fn to_record_batches(index: &VectorIndex, first_slot: usize, schema: &Arc<Schema>) -> Result<Vec<RecordBatch>> {
    let dim = i32::try_from(index.dim())?;
    let mut batches = Vec::new();
    for (n, block) in index.vectors().chunks(BATCH_SIZE).enumerate() {
        let start = first_slot + n * BATCH_SIZE;
        let slots = (start..start + block.len()).map(i32::try_from).collect::<Result<Vec<i32>, _>>()?;
        let vectors = block.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
        let batch = RecordBatch::try_new(schema.clone(), vec![
            Arc::new(Int32Array::from(slots)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim)),
        ])?;
        batches.push(batch);
    }
    Ok(batches)
}
