use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::Schema;
use futures::future::BoxFuture;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use tracing::debug;

use corpusdb_core::traits::VectorIndex;
use corpusdb_core::types::{Chunk, ChunkId, ChunkMetadata, FileKind, SearchFilters, SearchHit, SourceKind, Tag};

use crate::schema::build_chunk_schema;
use crate::table::{ensure_table, open_db, sql_literal};

/// Ids per `DELETE ... IN (...)` predicate.
const DELETE_BATCH: usize = 500;

/// Cosine nearest-neighbour index backed by a LanceDB table.
pub struct LanceVectorIndex {
	table: Table,
	schema: Arc<Schema>,
	dim: usize,
}

impl LanceVectorIndex {
	/// Connect to `uri` and open (or create) `table_name` for `dim`-wide vectors.
	pub async fn open(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let width = i32::try_from(dim).map_err(|_| anyhow!("embedding dimension {dim} too large"))?;
		let schema = build_chunk_schema(width);
		let conn = open_db(uri).await?;
		let table = ensure_table(&conn, table_name, schema.clone()).await?;
		debug!(uri, table = table_name, dim, "opened vector table");
		Ok(Self { table, schema, dim })
	}

	pub fn dim(&self) -> usize {
		self.dim
	}

	fn to_record_batch(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<RecordBatch> {
		let col = |f: fn(&Chunk) -> &str| StringArray::from(chunks.iter().map(f).collect::<Vec<_>>());
		let ordinals: Vec<i64> = chunks.iter().map(|c| c.ordinal as i64).collect();
		let vector_rows = vectors.iter().map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>()));
		let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vector_rows, self.dim as i32);
		Ok(RecordBatch::try_new(
			self.schema.clone(),
			vec![
				Arc::new(col(|c| c.id.as_str())),
				Arc::new(col(|c| c.source_path.as_str())),
				Arc::new(Int64Array::from(ordinals)),
				Arc::new(col(|c| c.text.as_str())),
				Arc::new(col(|c| c.metadata.technology.as_str())),
				Arc::new(col(|c| c.metadata.component.as_str())),
				Arc::new(col(|c| c.metadata.topic.as_str())),
				Arc::new(col(|c| c.metadata.version.as_str())),
				Arc::new(col(|c| c.metadata.file_kind.as_str())),
				Arc::new(vectors),
			],
		)?)
	}

	async fn upsert_inner(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
		if chunks.len() != vectors.len() {
			bail!("{} chunks but {} vectors", chunks.len(), vectors.len());
		}
		if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
			bail!("vector width {} does not match index dimension {}", bad.len(), self.dim);
		}
		if chunks.is_empty() {
			return Ok(());
		}
		let batch = self.to_record_batch(chunks, vectors)?;
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), self.schema.clone()));
		let mut merge = self.table.merge_insert(&["id"]);
		merge.when_matched_update_all(None).when_not_matched_insert_all();
		merge.execute(reader).await?;
		debug!(count = chunks.len(), "vector upsert committed");
		Ok(())
	}

	async fn delete_inner(&self, ids: &[ChunkId]) -> Result<()> {
		for group in ids.chunks(DELETE_BATCH) {
			let list = group.iter().map(|id| sql_literal(id)).collect::<Vec<_>>().join(", ");
			self.table.delete(&format!("id IN ({list})")).await?;
		}
		Ok(())
	}

	async fn query_inner(&self, vector: &[f32], filters: &SearchFilters, limit: usize) -> Result<Vec<SearchHit>> {
		if limit == 0 {
			return Ok(Vec::new());
		}
		if vector.len() != self.dim {
			bail!("query vector width {} does not match index dimension {}", vector.len(), self.dim);
		}
		let mut query = self.table.vector_search(vector.to_vec())?.distance_type(DistanceType::Cosine).limit(limit);
		if let Some(predicate) = filter_predicate(filters) {
			query = query.only_if(predicate);
		}
		let mut stream = query.execute().await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			hits.extend(batch_to_hits(&batch)?);
		}
		hits.retain(|h| filters.matches(&h.metadata));
		Ok(hits)
	}
}

fn filter_predicate(filters: &SearchFilters) -> Option<String> {
	let mut parts = Vec::new();
	if let Some(t) = &filters.technology {
		parts.push(format!("technology = {}", sql_literal(&t.to_lowercase())));
	}
	if let Some(c) = &filters.component {
		parts.push(format!("component = {}", sql_literal(&c.to_lowercase())));
	}
	(!parts.is_empty()).then(|| parts.join(" AND "))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| anyhow!("vector table column '{name}' missing or not utf8"))
}

fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
	let ids = string_column(batch, "id")?;
	let paths = string_column(batch, "source_path")?;
	let texts = string_column(batch, "text")?;
	let technology = string_column(batch, "technology")?;
	let component = string_column(batch, "component")?;
	let topic = string_column(batch, "topic")?;
	let version = string_column(batch, "version")?;
	let kinds = string_column(batch, "file_kind")?;
	let distances = batch
		.column_by_name("_distance")
		.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
		.ok_or_else(|| anyhow!("vector search result has no _distance column"))?;

	let mut hits = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let score = if distances.is_null(i) { 0.0 } else { 1.0 - distances.value(i) };
		hits.push(SearchHit {
			id: ids.value(i).to_string(),
			score: if score.is_finite() { score } else { 0.0 },
			source: SourceKind::Vector,
			text: texts.value(i).to_string(),
			metadata: ChunkMetadata {
				technology: Tag::new(technology.value(i)),
				component: Tag::new(component.value(i)),
				topic: Tag::new(topic.value(i)),
				version: Tag::new(version.value(i)),
				file_kind: FileKind::parse(kinds.value(i)).unwrap_or_default(),
				source_path: paths.value(i).to_string(),
			},
		});
	}
	Ok(hits)
}

impl VectorIndex for LanceVectorIndex {
	fn upsert<'a>(&'a self, chunks: &'a [Chunk], vectors: &'a [Vec<f32>]) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.upsert_inner(chunks, vectors))
	}

	fn delete<'a>(&'a self, ids: &'a [ChunkId]) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.delete_inner(ids))
	}

	fn query_nearest<'a>(
		&'a self,
		vector: &'a [f32],
		filters: &'a SearchFilters,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		Box::pin(self.query_inner(vector, filters, limit))
	}

	fn contains<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(self.table.count_rows(Some(format!("id = {}", sql_literal(id)))).await? > 0) })
	}

	fn len(&self) -> BoxFuture<'_, Result<usize>> {
		Box::pin(async move { Ok(self.table.count_rows(None).await?) })
	}

	fn clear(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			self.table.delete("true").await?;
			Ok(())
		})
	}
}
