use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Table holding one generation's vectors.
pub const VECTORS_TABLE: &str = "vectors";

/// `slot` is the vector's position in the index; `vector` is `dim` wide.
pub fn vector_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("slot", DataType::Int32, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
