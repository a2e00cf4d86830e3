//! Indexing runs: scan → diff → chunk/embed → write, with incremental change
//! detection through the checksum store.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use corpusdb_core::checksum::{ChecksumEntry, ChecksumStore};
use corpusdb_core::chunker::Chunker;
use corpusdb_core::config::Settings;
use corpusdb_core::metadata::MetadataExtractor;
use corpusdb_core::scan::{read_document, CorpusScanner, ScannedFile};
use corpusdb_core::traits::{Embedder, KeywordIndex, VectorIndex};
use corpusdb_core::types::{Chunk, ChunkId, ChunkMetadata, SearchFilters, SourceDocument};
use corpusdb_core::{Error, Result, Stage};

use crate::blocking;
use crate::report::{
    ids_of, ClearReport, IndexReport, IndexScope, IndexStats, Progress, ProgressCallback, RunState, SourceInfo,
};
use crate::retry::RetryPolicy;
use crate::writer::DualIndexWriter;

/// Shared handles the orchestrator and the query engine both use.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub keyword: Arc<dyn KeywordIndex>,
    pub vector: Arc<dyn VectorIndex>,
    pub checksums: Arc<ChecksumStore>,
}

/// A new or modified file found while diffing.
struct Pending {
    file: ScannedFile,
    checksum: String,
    metadata: ChunkMetadata,
}

/// A file whose new chunks are embedded and ready to write.
struct Prepared {
    key: String,
    checksum: String,
    metadata: ChunkMetadata,
    chunk_ids: Vec<ChunkId>,
    fresh: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    stale: Vec<ChunkId>,
    created: usize,
    reused: usize,
}

/// Counters behind the progress callback.
struct Tracker {
    callback: Option<ProgressCallback>,
    files_total: usize,
    files_done: usize,
    chunks_written: usize,
}

impl Tracker {
    fn emit(&self, state: RunState, chunks_in_flight: usize) {
        if let Some(cb) = &self.callback {
            cb(Progress {
                state,
                files_done: self.files_done,
                files_total: self.files_total,
                chunks_written: self.chunks_written + chunks_in_flight,
            });
        }
    }
}

pub struct IndexOrchestrator {
    scanner: CorpusScanner,
    extractor: MetadataExtractor,
    chunker: Chunker,
    parts: Collaborators,
    writer: DualIndexWriter,
    embed_policy: RetryPolicy,
    index_timeout: Duration,
    embed_batch: usize,
    write_batch: usize,
    run_lock: Mutex<()>,
    state: watch::Sender<RunState>,
    cancel: watch::Sender<bool>,
}

impl IndexOrchestrator {
    pub fn new(parts: Collaborators, settings: &Settings) -> Self {
        let scanner = CorpusScanner::new(settings.roots(), settings.corpus.exclude.iter().cloned())
            .with_data_dir(&settings.data_dir());
        let writer = DualIndexWriter::new(
            parts.keyword.clone(),
            parts.vector.clone(),
            &settings.batching,
            RetryPolicy::for_index(&settings.resilience),
        );
        let (state, _) = watch::channel(RunState::Idle);
        let (cancel, _) = watch::channel(false);
        Self {
            scanner,
            extractor: MetadataExtractor::new(&settings.corpus.technologies),
            chunker: Chunker::new(settings.chunking.clone()),
            parts,
            writer,
            embed_policy: RetryPolicy::for_embedding(&settings.resilience),
            index_timeout: Duration::from_millis(settings.resilience.index_timeout_ms),
            embed_batch: settings.batching.embed.max(1),
            write_batch: settings.batching.vector.max(1),
            run_lock: Mutex::new(()),
            state,
            cancel,
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Ask the active run to stop at the next file or batch boundary.
    /// Writes already committed stay.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn set_state(&self, state: RunState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "run state");
        }
    }

    /// Bring both indices and the checksum store in line with the corpus.
    ///
    /// Fails fast with [`Error::RunInProgress`] if another run or clear holds
    /// the lock. Per-file failures are recorded in the report; only failures
    /// of the checksum store itself abort the run.
    pub async fn run(&self, scope: &IndexScope, progress: Option<ProgressCallback>) -> Result<IndexReport> {
        let _guard = self.run_lock.try_lock().map_err(|_| Error::RunInProgress)?;
        self.cancel.send_replace(false);
        let started = Instant::now();
        let scope = normalize_scope(scope);
        info!(technology = ?scope.technology, paths = scope.paths.len(), rebuild = scope.rebuild, "index run started");

        let mut report = IndexReport::default();
        let mut tracker = Tracker { callback: progress, files_total: 0, files_done: 0, chunks_written: 0 };
        let outcome = self.run_inner(&scope, &mut report, &mut tracker).await;
        let flushed = self.parts.checksums.flush();
        report.duration_ms = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);

        match outcome.and(flushed) {
            Ok(()) => {
                self.set_state(RunState::Idle);
                info!(
                    processed = report.files_processed,
                    unchanged = report.files_unchanged,
                    removed = report.files_removed,
                    skipped = report.files_skipped,
                    chunks_created = report.chunks_created,
                    chunks_reused = report.chunks_reused,
                    chunks_removed = report.chunks_removed,
                    cancelled = report.cancelled,
                    duration_ms = report.duration_ms,
                    "index run finished"
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(RunState::Failed);
                error!(
                    error = %e,
                    processed = report.files_processed,
                    chunks_created = report.chunks_created,
                    "index run failed; committed files are kept"
                );
                Err(e)
            }
        }
    }

    async fn run_inner(&self, scope: &IndexScope, report: &mut IndexReport, tracker: &mut Tracker) -> Result<()> {
        self.set_state(RunState::Scanning);
        let scanner = self.scanner.clone();
        let (mut files, scan_errors) = tokio::task::spawn_blocking(move || scanner.scan()).await.map_err(join_error)?;

        // Entries under an unreadable directory or a missing root are kept,
        // not treated as deleted.
        let mut blocked: Vec<PathBuf> = Vec::new();
        for e in scan_errors {
            match e {
                Error::CorpusScan { path, message } => {
                    warn!(path = %path.display(), %message, "scan error");
                    report.skip(path.to_string_lossy(), message);
                    blocked.push(path);
                }
                other => report.skip("", other.to_string()),
            }
        }
        files.retain(|f| scope.covers_path(&f.path));
        report.files_scanned = files.len();

        if scope.rebuild {
            let cleared = self.clear_scoped(scope).await?;
            info!(files = cleared.files_removed, chunks = cleared.chunks_removed, "cleared scope before rebuild");
        }

        self.set_state(RunState::Diffing);
        let mut pending = Vec::new();
        let mut seen: HashSet<String> = HashSet::with_capacity(files.len());
        for file in files {
            if self.is_cancelled() {
                report.cancelled = true;
                return Ok(());
            }
            let key = file.path_key();
            seen.insert(key.clone());
            let doc = match read_blocking(file.clone()).await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %key, error = %e, "skipping unreadable file");
                    report.skip(key, e.to_string());
                    continue;
                }
            };
            if self.parts.checksums.is_unchanged(&key, &doc.checksum) {
                let entry = self.parts.checksums.get(&key);
                if entry.is_some_and(|e| scope.covers_technology(&e.metadata.technology)) {
                    report.files_unchanged += 1;
                }
                continue;
            }
            let metadata = self.extractor.extract(&doc.path, &doc.root, &doc.text);
            if !scope.covers_technology(&metadata.technology) {
                continue;
            }
            pending.push(Pending { file, checksum: doc.checksum, metadata });
        }

        let removed: Vec<(String, ChecksumEntry)> = self
            .parts
            .checksums
            .entries()
            .into_iter()
            .filter(|(path, entry)| {
                let p = Path::new(path);
                !seen.contains(path) && scope.covers(p, &entry.metadata) && !blocked.iter().any(|b| p.starts_with(b))
            })
            .collect();
        debug!(changed = pending.len(), removed = removed.len(), unchanged = report.files_unchanged, "diff complete");

        tracker.files_total = pending.len() + removed.len();
        tracker.emit(RunState::Diffing, 0);

        self.set_state(RunState::Writing);
        for (path, entry) in removed {
            if self.is_cancelled() {
                report.cancelled = true;
                return Ok(());
            }
            match self.writer.delete(&entry.chunk_ids).await {
                Ok(()) => {
                    self.parts.checksums.remove(&path)?;
                    report.files_removed += 1;
                    report.chunks_removed += entry.chunk_ids.len();
                    debug!(path = %path, chunks = entry.chunk_ids.len(), "removed deleted file");
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "failed to remove deleted file");
                    report.skip(path, e.to_string());
                }
            }
            tracker.files_done += 1;
            tracker.emit(RunState::Writing, 0);
        }

        let mut group: Vec<Prepared> = Vec::new();
        let mut group_chunks = 0;
        for p in pending {
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.set_state(RunState::ChunkingEmbedding);
            let key = p.file.path_key();
            match self.prepare(p).await {
                Ok(prepared) => {
                    group_chunks += prepared.fresh.len();
                    group.push(prepared);
                }
                Err(e) => {
                    warn!(path = %key, error = %e, "skipping file");
                    report.skip(key, e.to_string());
                    tracker.files_done += 1;
                }
            }
            if group_chunks >= self.write_batch {
                self.write_group(std::mem::take(&mut group), report, tracker).await?;
                group_chunks = 0;
            }
        }
        // Whatever is already embedded is still worth committing after a cancel.
        if !group.is_empty() {
            self.write_group(group, report, tracker).await?;
        }
        Ok(())
    }

    /// Re-read, chunk and embed one file. Chunks whose id is already indexed
    /// for this path are reused without embedding.
    async fn prepare(&self, p: Pending) -> Result<Prepared> {
        let doc = read_blocking(p.file).await?;
        let metadata = if doc.checksum == p.checksum {
            p.metadata
        } else {
            self.extractor.extract(&doc.path, &doc.root, &doc.text)
        };
        let key = doc.path_key();
        let chunks = self.chunker.chunk_all(&key, &doc.text, &metadata);
        let chunk_ids: Vec<ChunkId> = chunks.iter().map(|c| c.id.clone()).collect();

        let old_ids = self.parts.checksums.get(&key).map(|e| e.chunk_ids).unwrap_or_default();
        let old: HashSet<&str> = old_ids.iter().map(String::as_str).collect();
        let new: HashSet<&str> = chunk_ids.iter().map(String::as_str).collect();
        let stale: Vec<ChunkId> = old_ids.iter().filter(|id| !new.contains(id.as_str())).cloned().collect();
        let (reused, fresh): (Vec<Chunk>, Vec<Chunk>) = chunks.into_iter().partition(|c| old.contains(c.id.as_str()));

        let texts: Vec<String> = fresh.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_all(texts).await?;
        debug!(path = %key, fresh = fresh.len(), reused = reused.len(), stale = stale.len(), "prepared file");

        Ok(Prepared {
            key,
            checksum: doc.checksum,
            metadata,
            chunk_ids,
            created: fresh.len(),
            fresh,
            vectors,
            stale,
            reused: reused.len(),
        })
    }

    async fn embed_all(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embed_batch) {
            let out = self
                .embed_policy
                .run(Stage::Embed, || blocking::embed(self.parts.embedder.clone(), batch.to_vec()))
                .await?;
            vectors.extend(out);
        }
        Ok(vectors)
    }

    /// Write a group of prepared files: upsert new chunks, drop stale ids,
    /// then advance each file's checksum entry. A failed upsert skips every
    /// file of the group and leaves their entries untouched.
    async fn write_group(&self, group: Vec<Prepared>, report: &mut IndexReport, tracker: &mut Tracker) -> Result<()> {
        self.set_state(RunState::Writing);
        let mut chunks = Vec::new();
        let mut vectors = Vec::new();
        let mut files = Vec::with_capacity(group.len());
        for mut p in group {
            chunks.append(&mut p.fresh);
            vectors.append(&mut p.vectors);
            files.push(p);
        }

        let on_batch = |processed: usize, _total: usize| tracker.emit(RunState::Writing, processed);
        if let Err(e) = self.writer.upsert(&chunks, &vectors, &on_batch).await {
            warn!(error = %e, files = files.len(), chunks = chunks.len(), "batch write failed; files will be retried next run");
            for p in files {
                report.skip(p.key, e.to_string());
                tracker.files_done += 1;
            }
            return Ok(());
        }

        for p in files {
            tracker.files_done += 1;
            if let Err(e) = self.writer.delete(&p.stale).await {
                warn!(path = %p.key, error = %e, "failed to remove stale chunks");
                report.skip(p.key, e.to_string());
                continue;
            }
            report.files_processed += 1;
            report.chunks_created += p.created;
            report.chunks_reused += p.reused;
            report.chunks_removed += p.stale.len();
            tracker.chunks_written += p.created;
            debug!(path = %p.key, chunks = p.chunk_ids.len(), "indexed file");
            self.parts.checksums.put(&p.key, ChecksumEntry::new(p.checksum, p.chunk_ids, p.metadata))?;
        }
        tracker.emit(RunState::Writing, 0);
        Ok(())
    }

    /// Delete the scoped chunk ids from both indices and drop their checksum
    /// entries. Takes the run lock like [`Self::run`].
    pub async fn clear(&self, scope: &IndexScope) -> Result<ClearReport> {
        let _guard = self.run_lock.try_lock().map_err(|_| Error::RunInProgress)?;
        let scope = normalize_scope(scope);
        let report = self.clear_scoped(&scope).await?;
        info!(files = report.files_removed, chunks = report.chunks_removed, "cleared index");
        Ok(report)
    }

    async fn clear_scoped(&self, scope: &IndexScope) -> Result<ClearReport> {
        let checksums = &self.parts.checksums;
        if scope.is_everything() {
            let entries = checksums.entries();
            let report = ClearReport { files_removed: entries.len(), chunks_removed: ids_of(&entries).len() };
            self.writer.clear().await?;
            checksums.clear()?;
            return Ok(report);
        }
        let entries: Vec<(String, ChecksumEntry)> = checksums
            .entries()
            .into_iter()
            .filter(|(path, entry)| scope.covers(Path::new(path), &entry.metadata))
            .collect();
        let ids = ids_of(&entries);
        self.writer.delete(&ids).await?;
        for (path, _) in &entries {
            checksums.remove(path)?;
        }
        checksums.flush()?;
        Ok(ClearReport { files_removed: entries.len(), chunks_removed: ids.len() })
    }

    /// Counts from the checksum store plus both indices. An index that cannot
    /// be reached reports `None` instead of failing the call.
    pub async fn stats(&self) -> IndexStats {
        let entries = self.parts.checksums.entries();
        let mut technologies: BTreeMap<String, usize> = BTreeMap::new();
        for (_, e) in &entries {
            *technologies.entry(e.metadata.technology.to_string()).or_default() += 1;
        }

        let keyword = tokio::time::timeout(self.index_timeout, blocking::keyword_len(self.parts.keyword.clone()));
        let vector = tokio::time::timeout(self.index_timeout, self.parts.vector.len());
        let (keyword, vector) = tokio::join!(keyword, vector);
        let keyword_docs = match keyword {
            Ok(Ok(n)) => Some(n),
            Ok(Err(e)) => {
                warn!(error = %e, "keyword index count failed");
                None
            }
            Err(_) => None,
        };
        let vector_rows = match vector {
            Ok(Ok(n)) => Some(n),
            Ok(Err(e)) => {
                warn!(error = %e, "vector index count failed");
                None
            }
            Err(_) => None,
        };

        IndexStats {
            files: entries.len(),
            chunks: entries.iter().map(|(_, e)| e.chunk_ids.len()).sum(),
            keyword_docs,
            vector_rows,
            state: self.state(),
            last_indexed_at: entries.iter().map(|(_, e)| e.indexed_at).max(),
            technologies,
        }
    }

    /// Indexed source files matching `filters`, ordered by path.
    pub fn list_sources(&self, filters: &SearchFilters) -> Vec<SourceInfo> {
        self.parts
            .checksums
            .entries()
            .into_iter()
            .filter(|(_, e)| filters.matches(&e.metadata))
            .map(|(path, e)| SourceInfo {
                path,
                checksum: e.checksum,
                chunks: e.chunk_ids.len(),
                metadata: e.metadata,
                indexed_at: e.indexed_at,
            })
            .collect()
    }
}

async fn read_blocking(file: ScannedFile) -> Result<SourceDocument> {
    tokio::task::spawn_blocking(move || read_document(&file)).await.map_err(join_error)?
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Resolve scope paths the way the scanner resolves roots so prefix checks
/// compare like with like.
fn normalize_scope(scope: &IndexScope) -> IndexScope {
    let mut scope = scope.clone();
    scope.paths = scope
        .paths
        .iter()
        .map(|p| {
            p.canonicalize().unwrap_or_else(|_| {
                if p.is_absolute() {
                    p.clone()
                } else {
                    std::env::current_dir().map(|d| d.join(p)).unwrap_or_else(|_| p.clone())
                }
            })
        })
        .collect();
    scope
}
