//! Hybrid query engine: keyword and vector retrieval side by side, min-max
//! normalised and fused into one ranking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use corpusdb_core::config::{FusionSettings, ResilienceSettings};
use corpusdb_core::traits::{Embedder, KeywordIndex, VectorIndex};
use corpusdb_core::types::{Degradation, SearchFilters, SearchHit, SearchResponse};
use corpusdb_core::{Error, Result};

use crate::blocking;
use crate::fusion::{fuse, FusionWeights};
use crate::querylog::QueryLog;

/// Upper bound on candidates requested from either index per query.
pub const MAX_CANDIDATES: usize = 10_000;

pub struct HybridQueryEngine {
    keyword: Arc<dyn KeywordIndex>,
    vector: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    weights: FusionWeights,
    overfetch: usize,
    embed_timeout: Duration,
    index_timeout: Duration,
    log: Arc<QueryLog>,
}

impl HybridQueryEngine {
    pub fn new(
        keyword: Arc<dyn KeywordIndex>,
        vector: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        fusion: &FusionSettings,
        resilience: &ResilienceSettings,
    ) -> Self {
        Self {
            keyword,
            vector,
            embedder,
            weights: FusionWeights { keyword: fusion.keyword_weight, semantic: fusion.semantic_weight },
            overfetch: fusion.overfetch.max(1),
            embed_timeout: Duration::from_millis(resilience.embed_timeout_ms),
            index_timeout: Duration::from_millis(resilience.index_timeout_ms),
            log: Arc::new(QueryLog::disabled()),
        }
    }

    pub fn with_query_log(mut self, log: Arc<QueryLog>) -> Self {
        self.log = log;
        self
    }

    /// Top `top_k` chunks for `query`, restricted by `filters`.
    ///
    /// If exactly one side fails, results come from the other side alone and
    /// the response carries a [`Degradation`]. If both fail the search fails
    /// with [`Error::SearchUnavailable`].
    pub async fn search(&self, query: &str, filters: &SearchFilters, top_k: usize) -> Result<SearchResponse> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(SearchResponse::default());
        }
        let started = Instant::now();
        let limit = top_k.saturating_mul(self.overfetch).min(MAX_CANDIDATES);

        let (keyword, vector) =
            tokio::join!(self.keyword_candidates(query, filters, limit), self.vector_candidates(query, filters, limit));

        let response = match (keyword, vector) {
            (Ok(kw), Ok(vs)) => {
                debug!(keyword = kw.len(), vector = vs.len(), "fusing candidates");
                SearchResponse { results: fuse(&kw, &vs, self.weights, top_k), degraded: None }
            }
            (Ok(kw), Err(reason)) => {
                warn!(%reason, "vector index unavailable; keyword-only results");
                SearchResponse {
                    results: fuse(&kw, &[], FusionWeights::KEYWORD_ONLY, top_k),
                    degraded: Some(Degradation::VectorUnavailable(reason)),
                }
            }
            (Err(reason), Ok(vs)) => {
                warn!(%reason, "keyword index unavailable; semantic-only results");
                SearchResponse {
                    results: fuse(&[], &vs, FusionWeights::SEMANTIC_ONLY, top_k),
                    degraded: Some(Degradation::KeywordUnavailable(reason)),
                }
            }
            (Err(keyword), Err(vector)) => return Err(Error::SearchUnavailable { keyword, vector }),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.log.record(query, filters, top_k, &response, elapsed_ms);
        debug!(results = response.results.len(), elapsed_ms, "search complete");
        Ok(response)
    }

    async fn keyword_candidates(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> std::result::Result<Vec<SearchHit>, String> {
        let call = blocking::keyword_query(self.keyword.clone(), query.to_string(), filters.clone(), limit);
        let hits = within(self.index_timeout, call).await?;
        Ok(post_filter(hits, filters))
    }

    async fn vector_candidates(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> std::result::Result<Vec<SearchHit>, String> {
        let embedded = within(self.embed_timeout, blocking::embed(self.embedder.clone(), vec![query.to_string()])).await?;
        let Some(vector) = embedded.into_iter().next() else {
            return Err("embedder returned no vector for the query".into());
        };
        let hits = within(self.index_timeout, self.vector.query_nearest(&vector, filters, limit)).await?;
        Ok(post_filter(hits, filters))
    }
}

async fn within<T>(
    timeout: Duration,
    call: impl std::future::Future<Output = anyhow::Result<T>>,
) -> std::result::Result<T, String> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(_) => Err(format!("timed out after {} ms", timeout.as_millis())),
    }
}

/// Indices apply filters themselves; this re-check guards adapters that
/// over-return.
fn post_filter(mut hits: Vec<SearchHit>, filters: &SearchFilters) -> Vec<SearchHit> {
    if !filters.is_empty() {
        hits.retain(|h| filters.matches(&h.metadata));
    }
    hits
}
