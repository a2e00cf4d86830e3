//! Values returned by indexing runs, clears and stats queries.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use corpusdb_core::types::{ChunkId, ChunkMetadata, Tag};

/// Restricts a run (or a clear) to part of the corpus.
///
/// An empty scope covers everything. `paths` entries match a file when they
/// equal it or are one of its ancestor directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexScope {
    pub technology: Option<String>,
    pub paths: Vec<PathBuf>,
    /// Delete the scoped chunk ids and checksum entries before the run.
    pub rebuild: bool,
}

impl IndexScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn technology(mut self, technology: impl AsRef<str>) -> Self {
        self.technology = Some(technology.as_ref().trim().to_lowercase());
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    pub fn is_everything(&self) -> bool {
        self.technology.is_none() && self.paths.is_empty()
    }

    pub fn covers_path(&self, path: &Path) -> bool {
        self.paths.is_empty() || self.paths.iter().any(|p| path.starts_with(p))
    }

    pub fn covers_technology(&self, technology: &Tag) -> bool {
        self.technology.as_deref().map_or(true, |t| t.eq_ignore_ascii_case(technology.as_str()))
    }

    pub fn covers(&self, path: &Path, metadata: &ChunkMetadata) -> bool {
        self.covers_path(path) && self.covers_technology(&metadata.technology)
    }
}

/// A file that was skipped because of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub path: String,
    pub message: String,
}

/// Summary of one indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    pub files_scanned: usize,
    /// New or modified files whose chunks were written and whose checksum
    /// entry was advanced.
    pub files_processed: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    /// Files skipped because of an error; equals `errors.len()` for file-level
    /// errors.
    pub files_skipped: usize,
    pub chunks_created: usize,
    pub chunks_reused: usize,
    pub chunks_removed: usize,
    pub errors: Vec<FileError>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl IndexReport {
    pub(crate) fn skip(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.files_skipped += 1;
        self.errors.push(FileError { path: path.into(), message: message.into() });
    }
}

/// Orchestrator state machine. `Failed` holds until the next run starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Scanning,
    Diffing,
    ChunkingEmbedding,
    Writing,
    Failed,
}

impl RunState {
    pub fn is_running(self) -> bool {
        !matches!(self, Self::Idle | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Diffing => "diffing",
            Self::ChunkingEmbedding => "chunking/embedding",
            Self::Writing => "writing",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot handed to the progress callback at batch boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub state: RunState,
    pub files_done: usize,
    pub files_total: usize,
    pub chunks_written: usize,
}

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub files: usize,
    pub chunks: usize,
    /// `None` when the index could not be reached.
    pub keyword_docs: Option<usize>,
    pub vector_rows: Option<usize>,
    pub state: RunState,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub technologies: BTreeMap<String, usize>,
}

impl IndexStats {
    /// Both indices hold exactly the chunk ids the checksum store knows about.
    pub fn is_consistent(&self) -> bool {
        self.keyword_docs == Some(self.chunks) && self.vector_rows == Some(self.chunks)
    }
}

/// One indexed source file as recorded in the checksum store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub path: String,
    pub checksum: String,
    pub chunks: usize,
    pub metadata: ChunkMetadata,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClearReport {
    pub files_removed: usize,
    pub chunks_removed: usize,
}

pub(crate) fn ids_of(entries: &[(String, corpusdb_core::checksum::ChecksumEntry)]) -> Vec<ChunkId> {
    entries.iter().flat_map(|(_, e)| e.chunk_ids.iter().cloned()).collect()
}
