use futures::future::BoxFuture;

use crate::types::{Chunk, ChunkId, SearchFilters, SearchHit};

/// Maps chunk text to fixed-length vectors. Blocking; callers run it on the
/// blocking pool.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Inverted keyword index over chunk text plus filterable metadata.
///
/// Blocking; callers run it on the blocking pool. `upsert` replaces any
/// existing document with the same chunk id and is visible to `query` once
/// it returns.
pub trait KeywordIndex: Send + Sync {
    fn upsert(&self, chunks: &[Chunk]) -> anyhow::Result<()>;
    fn delete(&self, ids: &[ChunkId]) -> anyhow::Result<()>;
    fn query(&self, text: &str, filters: &SearchFilters, limit: usize) -> anyhow::Result<Vec<SearchHit>>;
    fn contains(&self, id: &str) -> anyhow::Result<bool>;
    fn len(&self) -> anyhow::Result<usize>;
    /// Remove every document.
    fn clear(&self) -> anyhow::Result<()>;
}

/// Vector similarity index. `vectors[i]` belongs to `chunks[i]`.
pub trait VectorIndex: Send + Sync {
    fn upsert<'a>(&'a self, chunks: &'a [Chunk], vectors: &'a [Vec<f32>]) -> BoxFuture<'a, anyhow::Result<()>>;
    fn delete<'a>(&'a self, ids: &'a [ChunkId]) -> BoxFuture<'a, anyhow::Result<()>>;
    fn query_nearest<'a>(
        &'a self,
        vector: &'a [f32],
        filters: &'a SearchFilters,
        limit: usize,
    ) -> BoxFuture<'a, anyhow::Result<Vec<SearchHit>>>;
    fn contains<'a>(&'a self, id: &'a str) -> BoxFuture<'a, anyhow::Result<bool>>;
    fn len(&self) -> BoxFuture<'_, anyhow::Result<usize>>;
    fn clear(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}
