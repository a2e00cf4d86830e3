//! `CorpusService`: the upward-facing facade wiring settings, adapters, the
//! orchestrator and the query engine together.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use corpusdb_core::checksum::ChecksumStore;
use corpusdb_core::config::Settings;
use corpusdb_core::traits::{KeywordIndex, VectorIndex};
use corpusdb_core::types::{SearchFilters, SearchResponse};
use corpusdb_core::{Error, Result};
use corpusdb_text::TantivyKeywordIndex;
use corpusdb_vector::schema::DEFAULT_TABLE;
use corpusdb_vector::LanceVectorIndex;

use crate::engine::HybridQueryEngine;
use crate::orchestrator::{Collaborators, IndexOrchestrator};
use crate::querylog::QueryLog;
use crate::report::{ClearReport, IndexReport, IndexScope, IndexStats, ProgressCallback, RunState, SourceInfo};

pub const KEYWORD_DIR: &str = "keyword";
pub const VECTOR_DIR: &str = "vectors";
pub const CHECKSUM_FILE: &str = "checksums.json";
pub const QUERY_LOG_FILE: &str = "query_log.jsonl";

pub struct CorpusService {
    settings: Settings,
    engine: HybridQueryEngine,
    orchestrator: IndexOrchestrator,
}

impl CorpusService {
    /// Open the on-disk engine under `settings.storage.data_dir`: Tantivy in
    /// `keyword/`, LanceDB in `vectors/`, the checksum store and the query log
    /// next to them.
    pub async fn open(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let data_dir = settings.data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let embedder = corpusdb_embed::get_default_embedder(&settings.embedding)
            .map_err(|e| Error::Configuration(format!("cannot load embedder: {e:#}")))?;

        let keyword_dir = data_dir.join(KEYWORD_DIR);
        let keyword: Arc<dyn KeywordIndex> = Arc::new(
            TantivyKeywordIndex::open(&keyword_dir)
                .map_err(|e| open_error("keyword index", &keyword_dir, e))?,
        );

        let vector_dir = data_dir.join(VECTOR_DIR);
        let uri = vector_dir.to_string_lossy().to_string();
        let vector: Arc<dyn VectorIndex> = Arc::new(
            LanceVectorIndex::open(&uri, DEFAULT_TABLE, embedder.dim())
                .await
                .map_err(|e| open_error("vector index", &vector_dir, e))?,
        );

        let checksums =
            Arc::new(ChecksumStore::open(data_dir.join(CHECKSUM_FILE), settings.batching.checksum_flush_every)?);
        let log = Arc::new(QueryLog::open(&data_dir.join(QUERY_LOG_FILE))?);

        info!(data_dir = %data_dir.display(), dim = embedder.dim(), files = checksums.len(), "corpus service ready");
        Ok(Self::with_components(settings, Collaborators { embedder, keyword, vector, checksums }, log))
    }

    /// Assemble a service from already-built collaborators.
    pub fn with_components(settings: Settings, parts: Collaborators, log: Arc<QueryLog>) -> Self {
        let engine = HybridQueryEngine::new(
            parts.keyword.clone(),
            parts.vector.clone(),
            parts.embedder.clone(),
            &settings.fusion,
            &settings.resilience,
        )
        .with_query_log(log);
        let orchestrator = IndexOrchestrator::new(parts, &settings);
        Self { settings, engine, orchestrator }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn engine(&self) -> &HybridQueryEngine {
        &self.engine
    }

    pub fn orchestrator(&self) -> &IndexOrchestrator {
        &self.orchestrator
    }

    pub async fn index_corpus(&self, scope: &IndexScope) -> Result<IndexReport> {
        self.orchestrator.run(scope, None).await
    }

    pub async fn index_corpus_with_progress(&self, scope: &IndexScope, progress: ProgressCallback) -> Result<IndexReport> {
        self.orchestrator.run(scope, Some(progress)).await
    }

    pub async fn search(&self, query: &str, filters: &SearchFilters, top_k: usize) -> Result<SearchResponse> {
        self.engine.search(query, filters, top_k).await
    }

    pub async fn stats(&self) -> IndexStats {
        self.orchestrator.stats().await
    }

    pub fn list_sources(&self, filters: &SearchFilters) -> Vec<SourceInfo> {
        self.orchestrator.list_sources(filters)
    }

    pub async fn clear(&self, scope: &IndexScope) -> Result<ClearReport> {
        self.orchestrator.clear(scope).await
    }

    pub fn cancel(&self) {
        self.orchestrator.cancel();
    }

    pub fn state(&self) -> RunState {
        self.orchestrator.state()
    }
}

fn open_error(what: &str, path: &Path, e: anyhow::Error) -> Error {
    Error::Configuration(format!("cannot open {what} at {}: {e:#}", path.display()))
}
