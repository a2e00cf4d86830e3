use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use futures::future::BoxFuture;

use corpusdb_core::traits::VectorIndex;
use corpusdb_core::types::{Chunk, ChunkId, SearchFilters, SearchHit, SourceKind};

/// Exhaustive cosine search over vectors held in memory.
pub struct MemoryVectorIndex {
	dim: usize,
	rows: RwLock<HashMap<ChunkId, (Chunk, Vec<f32>)>>,
}

impl MemoryVectorIndex {
	pub fn new(dim: usize) -> Self {
		Self { dim, rows: RwLock::new(HashMap::new()) }
	}

	fn read(&self) -> RwLockReadGuard<'_, HashMap<ChunkId, (Chunk, Vec<f32>)>> {
		self.rows.read().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, HashMap<ChunkId, (Chunk, Vec<f32>)>> {
		self.rows.write().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	fn upsert_now(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
		if chunks.len() != vectors.len() {
			bail!("{} chunks but {} vectors", chunks.len(), vectors.len());
		}
		if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
			bail!("vector width {} does not match index dimension {}", bad.len(), self.dim);
		}
		let mut rows = self.write();
		for (chunk, vector) in chunks.iter().zip(vectors) {
			rows.insert(chunk.id.clone(), (chunk.clone(), vector.clone()));
		}
		Ok(())
	}

	fn query_now(&self, vector: &[f32], filters: &SearchFilters, limit: usize) -> Result<Vec<SearchHit>> {
		if vector.len() != self.dim {
			bail!("query vector width {} does not match index dimension {}", vector.len(), self.dim);
		}
		let rows = self.read();
		let mut hits: Vec<SearchHit> = rows
			.values()
			.filter(|(chunk, _)| filters.matches(&chunk.metadata))
			.map(|(chunk, v)| SearchHit {
				id: chunk.id.clone(),
				score: cosine(vector, v),
				source: SourceKind::Vector,
				text: chunk.text.clone(),
				metadata: chunk.metadata.clone(),
			})
			.collect();
		hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
		hits.truncate(limit);
		Ok(hits)
	}
}

/// Cosine similarity; 0.0 when either side has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
	for (x, y) in a.iter().zip(b) {
		dot += x * y;
		na += x * x;
		nb += y * y;
	}
	if na == 0.0 || nb == 0.0 {
		return 0.0;
	}
	dot / (na.sqrt() * nb.sqrt())
}

impl VectorIndex for MemoryVectorIndex {
	fn upsert<'a>(&'a self, chunks: &'a [Chunk], vectors: &'a [Vec<f32>]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { self.upsert_now(chunks, vectors) })
	}

	fn delete<'a>(&'a self, ids: &'a [ChunkId]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut rows = self.write();
			for id in ids {
				rows.remove(id);
			}
			Ok(())
		})
	}

	fn query_nearest<'a>(
		&'a self,
		vector: &'a [f32],
		filters: &'a SearchFilters,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		Box::pin(async move { self.query_now(vector, filters, limit) })
	}

	fn contains<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(self.read().contains_key(id)) })
	}

	fn len(&self) -> BoxFuture<'_, Result<usize>> {
		Box::pin(async move { Ok(self.read().len()) })
	}

	fn clear(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			self.write().clear();
			Ok(())
		})
	}
}
