//! Async wrappers running the blocking collaborators on the blocking pool.

use std::sync::Arc;

use anyhow::{bail, Result};

use corpusdb_core::traits::{Embedder, KeywordIndex};
use corpusdb_core::types::{Chunk, ChunkId, SearchFilters, SearchHit};

pub async fn embed(embedder: Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let expected = texts.len();
    let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts)).await??;
    if vectors.len() != expected {
        bail!("embedder returned {} vectors for {expected} texts", vectors.len());
    }
    Ok(vectors)
}

pub async fn keyword_upsert(index: Arc<dyn KeywordIndex>, chunks: Vec<Chunk>) -> Result<()> {
    tokio::task::spawn_blocking(move || index.upsert(&chunks)).await?
}

pub async fn keyword_delete(index: Arc<dyn KeywordIndex>, ids: Vec<ChunkId>) -> Result<()> {
    tokio::task::spawn_blocking(move || index.delete(&ids)).await?
}

pub async fn keyword_query(
    index: Arc<dyn KeywordIndex>,
    query: String,
    filters: SearchFilters,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    tokio::task::spawn_blocking(move || index.query(&query, &filters, limit)).await?
}

pub async fn keyword_len(index: Arc<dyn KeywordIndex>) -> Result<usize> {
    tokio::task::spawn_blocking(move || index.len()).await?
}

pub async fn keyword_clear(index: Arc<dyn KeywordIndex>) -> Result<()> {
    tokio::task::spawn_blocking(move || index.clear()).await?
}
