#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use futures::future::BoxFuture;
use tempfile::TempDir;

use corpusdb_core::checksum::ChecksumStore;
use corpusdb_core::config::{ResilienceSettings, Settings};
use corpusdb_core::traits::{Embedder, KeywordIndex, VectorIndex};
use corpusdb_core::types::{Chunk, ChunkId, SearchFilters, SearchHit};
use corpusdb_embed::HashEmbedder;
use corpusdb_hybrid::{Collaborators, CorpusService, QueryLog};
use corpusdb_text::TantivyKeywordIndex;
use corpusdb_vector::MemoryVectorIndex;

pub const DIM: usize = 64;

const FILLER: &[&str] = &[
    "cluster", "node", "volume", "secret", "replica", "network", "policy", "gateway", "storage", "scheduler",
    "container", "registry", "manifest", "rollout", "probe", "quota",
];

/// `n` words of deterministic prose: sentences of twelve words, paragraphs
/// of five sentences.
pub fn prose(n: usize, salt: &str) -> String {
    let mut out = String::new();
    for i in 0..n {
        if i > 0 {
            out.push_str(if i % 60 == 0 { "\n\n" } else { " " });
        }
        if i % 17 == 0 {
            out.push_str(salt);
        } else {
            out.push_str(FILLER[(i * 7 + salt.len()) % FILLER.len()]);
        }
        if i % 12 == 11 || i + 1 == n {
            out.push('.');
        }
    }
    out.push('\n');
    out
}

/// Twenty words containing `term` exactly `times` times.
pub fn with_term(term: &str, times: usize) -> String {
    let mut words: Vec<&str> = FILLER.iter().cycle().take(20 - times).copied().collect();
    for _ in 0..times {
        words.push(term);
    }
    format!("{}.\n", words.join(" "))
}

pub fn write(root: &Path, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(&path, content).expect("write");
    path
}

pub fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Vector index double that can be switched off or made to fail upserts.
pub struct FlakyVector {
    inner: MemoryVectorIndex,
    pub down: AtomicBool,
    pub failing_upserts: AtomicU32,
}

impl FlakyVector {
    pub fn new(dim: usize) -> Self {
        Self { inner: MemoryVectorIndex::new(dim), down: AtomicBool::new(false), failing_upserts: AtomicU32::new(0) }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.down.load(Ordering::SeqCst) {
            bail!("vector index unreachable");
        }
        Ok(())
    }
}

impl VectorIndex for FlakyVector {
    fn upsert<'a>(&'a self, chunks: &'a [Chunk], vectors: &'a [Vec<f32>]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.check()?;
            if self.failing_upserts.load(Ordering::SeqCst) > 0 {
                self.failing_upserts.fetch_sub(1, Ordering::SeqCst);
                bail!("injected upsert failure");
            }
            self.inner.upsert(chunks, vectors).await
        })
    }

    fn delete<'a>(&'a self, ids: &'a [ChunkId]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.check()?;
            self.inner.delete(ids).await
        })
    }

    fn query_nearest<'a>(
        &'a self,
        vector: &'a [f32],
        filters: &'a SearchFilters,
        limit: usize,
    ) -> BoxFuture<'a, anyhow::Result<Vec<SearchHit>>> {
        Box::pin(async move {
            self.check()?;
            self.inner.query_nearest(vector, filters, limit).await
        })
    }

    fn contains<'a>(&'a self, id: &'a str) -> BoxFuture<'a, anyhow::Result<bool>> {
        Box::pin(async move {
            self.check()?;
            self.inner.contains(id).await
        })
    }

    fn len(&self) -> BoxFuture<'_, anyhow::Result<usize>> {
        Box::pin(async move {
            self.check()?;
            self.inner.len().await
        })
    }

    fn clear(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.check()?;
            self.inner.clear().await
        })
    }
}

/// Keyword index double that can be switched off.
pub struct FlakyKeyword {
    inner: TantivyKeywordIndex,
    pub down: AtomicBool,
}

impl FlakyKeyword {
    pub fn new() -> Self {
        Self { inner: TantivyKeywordIndex::in_memory().expect("keyword index"), down: AtomicBool::new(false) }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.down.load(Ordering::SeqCst) {
            bail!("keyword index unreachable");
        }
        Ok(())
    }
}

impl KeywordIndex for FlakyKeyword {
    fn upsert(&self, chunks: &[Chunk]) -> anyhow::Result<()> {
        self.check()?;
        self.inner.upsert(chunks)
    }

    fn delete(&self, ids: &[ChunkId]) -> anyhow::Result<()> {
        self.check()?;
        self.inner.delete(ids)
    }

    fn query(&self, text: &str, filters: &SearchFilters, limit: usize) -> anyhow::Result<Vec<SearchHit>> {
        self.check()?;
        self.inner.query(text, filters, limit)
    }

    fn contains(&self, id: &str) -> anyhow::Result<bool> {
        self.check()?;
        self.inner.contains(id)
    }

    fn len(&self) -> anyhow::Result<usize> {
        self.check()?;
        self.inner.len()
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.check()?;
        self.inner.clear()
    }
}

/// Hashing embedder that counts embedded texts and can sleep per batch.
pub struct CountingEmbedder {
    inner: HashEmbedder,
    pub texts: AtomicUsize,
    pub delay: Duration,
}

impl CountingEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self { inner: HashEmbedder::new(DIM), texts: AtomicUsize::new(0), delay }
    }
}

impl Embedder for CountingEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    fn max_len(&self) -> usize {
        self.inner.max_len()
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts)
    }
}

pub struct Harness {
    _tmp: TempDir,
    pub corpus: PathBuf,
    pub data_dir: PathBuf,
    pub service: Arc<CorpusService>,
    pub keyword: Arc<FlakyKeyword>,
    pub vector: Arc<FlakyVector>,
    pub embedder: Arc<CountingEmbedder>,
    pub checksums: Arc<ChecksumStore>,
    pub query_log: Arc<QueryLog>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Duration::ZERO, |_| {})
    }

    pub fn build(embed_delay: Duration, tweak: impl FnOnce(&mut Settings)) -> Self {
        Self::assemble(embed_delay, tweak, false)
    }

    /// Like [`Harness::build`] but with the checksum store persisted under the
    /// data directory at `checksum_path()`.
    pub fn persistent(tweak: impl FnOnce(&mut Settings)) -> Self {
        Self::assemble(Duration::ZERO, tweak, true)
    }

    fn assemble(embed_delay: Duration, tweak: impl FnOnce(&mut Settings), on_disk: bool) -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let corpus_dir = tmp.path().join("corpus");
        std::fs::create_dir_all(&corpus_dir).expect("mkdir corpus");
        let corpus = corpus_dir.canonicalize().expect("canonical corpus");
        let data_dir = tmp.path().join("data");

        let mut settings = Settings::default();
        settings.corpus.roots = vec![key(&corpus)];
        settings.storage.data_dir = key(&data_dir);
        settings.embedding.fake = true;
        settings.embedding.dim = DIM;
        settings.resilience =
            ResilienceSettings { embed_timeout_ms: 10_000, index_timeout_ms: 10_000, max_retries: 1, backoff_ms: 1 };
        tweak(&mut settings);
        settings.validate().expect("valid settings");

        let keyword = Arc::new(FlakyKeyword::new());
        let vector = Arc::new(FlakyVector::new(DIM));
        let embedder = Arc::new(CountingEmbedder::new(embed_delay));
        let checksums = if on_disk {
            let store = ChecksumStore::open(data_dir.join("checksums.json"), settings.batching.checksum_flush_every);
            Arc::new(store.expect("checksum store"))
        } else {
            Arc::new(ChecksumStore::in_memory())
        };
        let log = Arc::new(QueryLog::open(&data_dir.join("query_log.jsonl")).expect("query log"));
        let parts = Collaborators {
            embedder: embedder.clone(),
            keyword: keyword.clone(),
            vector: vector.clone(),
            checksums: checksums.clone(),
        };
        let service = Arc::new(CorpusService::with_components(settings, parts, log.clone()));
        Self { _tmp: tmp, corpus, data_dir, service, keyword, vector, embedder, checksums, query_log: log }
    }

    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
        write(&self.corpus, rel, content)
    }

    pub fn checksum_path(&self) -> PathBuf {
        self.data_dir.join("checksums.json")
    }

    pub fn chunk_ids(&self, path: &Path) -> Vec<ChunkId> {
        self.checksums.get(&key(path)).map(|e| e.chunk_ids).unwrap_or_default()
    }

    pub async fn in_both(&self, id: &str) -> (bool, bool) {
        let kw = self.keyword.contains(id).expect("keyword contains");
        let vs = self.vector.contains(id).await.expect("vector contains");
        (kw, vs)
    }
}
