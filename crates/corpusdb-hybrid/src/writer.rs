//! Writes chunk records to both indices as a small saga: keyword index
//! first, then vector index. The caller advances the checksum watermark only
//! after both succeed.

use std::sync::Arc;

use tracing::{debug, warn};

use corpusdb_core::config::BatchingSettings;
use corpusdb_core::traits::{KeywordIndex, VectorIndex};
use corpusdb_core::types::{Chunk, ChunkId};
use corpusdb_core::{Error, Result, Stage};

use crate::blocking;
use crate::retry::RetryPolicy;

pub struct DualIndexWriter {
    keyword: Arc<dyn KeywordIndex>,
    vector: Arc<dyn VectorIndex>,
    keyword_batch: usize,
    vector_batch: usize,
    policy: RetryPolicy,
}

impl DualIndexWriter {
    pub fn new(
        keyword: Arc<dyn KeywordIndex>,
        vector: Arc<dyn VectorIndex>,
        batching: &BatchingSettings,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            keyword,
            vector,
            keyword_batch: batching.keyword.max(1),
            vector_batch: batching.vector.max(1),
            policy,
        }
    }

    /// Write `chunks` (with `vectors[i]` for `chunks[i]`) to both indices.
    ///
    /// `progress(processed, total)` fires after every vector batch, when
    /// those chunks exist in both indices. On failure the ids of this call
    /// are removed again from both indices on a best-effort basis.
    pub async fn upsert(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(Error::TransientIndex {
                stage: Stage::Embed,
                attempts: 1,
                message: format!("{} chunks but {} vectors", chunks.len(), vectors.len()),
            });
        }
        if chunks.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.upsert_keyword(chunks).await {
            self.compensate(chunks).await;
            return Err(e);
        }
        if let Err(e) = self.upsert_vector(chunks, vectors, progress).await {
            self.compensate(chunks).await;
            return Err(e);
        }
        Ok(())
    }

    async fn upsert_keyword(&self, chunks: &[Chunk]) -> Result<()> {
        for batch in chunks.chunks(self.keyword_batch) {
            self.policy
                .run(Stage::KeywordWrite, || blocking::keyword_upsert(self.keyword.clone(), batch.to_vec()))
                .await?;
            debug!(batch = batch.len(), "keyword batch written");
        }
        Ok(())
    }

    async fn upsert_vector(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<()> {
        let total = chunks.len();
        let mut processed = 0;
        for (batch, batch_vectors) in chunks.chunks(self.vector_batch).zip(vectors.chunks(self.vector_batch)) {
            self.policy.run(Stage::VectorWrite, || self.vector.upsert(batch, batch_vectors)).await?;
            processed += batch.len();
            debug!(batch = batch.len(), processed, total, "vector batch written");
            progress(processed, total);
        }
        Ok(())
    }

    async fn compensate(&self, chunks: &[Chunk]) {
        let ids: Vec<ChunkId> = chunks.iter().map(|c| c.id.clone()).collect();
        if let Err(e) = self.delete(&ids).await {
            warn!(error = %e, count = ids.len(), "compensating delete failed; records may be orphaned until the next run");
        }
    }

    /// Remove `ids` from both indices. Missing ids are not an error.
    pub async fn delete(&self, ids: &[ChunkId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        for batch in ids.chunks(self.keyword_batch) {
            self.policy
                .run(Stage::KeywordDelete, || blocking::keyword_delete(self.keyword.clone(), batch.to_vec()))
                .await?;
        }
        for batch in ids.chunks(self.vector_batch) {
            self.policy.run(Stage::VectorDelete, || self.vector.delete(batch)).await?;
        }
        debug!(count = ids.len(), "deleted from both indices");
        Ok(())
    }

    /// Remove every record from both indices.
    pub async fn clear(&self) -> Result<()> {
        self.policy.run(Stage::KeywordDelete, || blocking::keyword_clear(self.keyword.clone())).await?;
        self.policy.run(Stage::VectorDelete, || self.vector.clear()).await?;
        Ok(())
    }
}
