//! LanceDB connection and table helpers.
use anyhow::Result;
use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection, Table};
use std::sync::Arc;

pub async fn open_db(uri: &str) -> Result<Connection> {
	Ok(connect(uri).execute().await?)
}

/// Open `name`, creating it empty with `schema` when missing.
pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<Table> {
	let names = conn.table_names().execute().await?;
	if names.iter().any(|n| n == name) {
		return Ok(conn.open_table(name).execute().await?);
	}
	let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
	Ok(conn.create_table(name, Box::new(iter)).execute().await?)
}

/// Quote a string literal for a Lance SQL predicate.
pub fn sql_literal(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}
