//! Arrow schema of the chunk table.
use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const DEFAULT_TABLE: &str = "chunks";

/// Metadata columns are stored as plain strings (`unknown` for unset tags)
/// so that `only_if` predicates can filter on them.
pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("source_path", DataType::Utf8, false),
		Field::new("ordinal", DataType::Int64, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("technology", DataType::Utf8, false),
		Field::new("component", DataType::Utf8, false),
		Field::new("topic", DataType::Utf8, false),
		Field::new("version", DataType::Utf8, false),
		Field::new("file_kind", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
