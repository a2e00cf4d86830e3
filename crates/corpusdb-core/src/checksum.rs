//! Per-file content fingerprints and the chunk ids indexed for them.
//!
//! The on-disk form is a single JSON document replaced atomically (temp file
//! in the same directory, then rename). Writes are batched: the file is
//! rewritten after every `flush_every` mutations and on explicit `flush()`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::types::{ChunkId, ChunkMetadata};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecksumEntry {
    pub checksum: String,
    pub chunk_ids: Vec<ChunkId>,
    pub metadata: ChunkMetadata,
    pub indexed_at: DateTime<Utc>,
}

impl ChecksumEntry {
    pub fn new(checksum: impl Into<String>, chunk_ids: Vec<ChunkId>, metadata: ChunkMetadata) -> Self {
        Self { checksum: checksum.into(), chunk_ids, metadata, indexed_at: Utc::now() }
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: BTreeMap<String, ChecksumEntry>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, ChecksumEntry>,
    pending: usize,
}

pub struct ChecksumStore {
    path: Option<PathBuf>,
    flush_every: usize,
    inner: Mutex<Inner>,
}

impl ChecksumStore {
    /// Open (or start) the store persisted at `path`.
    pub fn open(path: impl Into<PathBuf>, flush_every: usize) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
            snapshot.entries
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "opened checksum store");
        Ok(Self {
            path: Some(path),
            flush_every: flush_every.max(1),
            inner: Mutex::new(Inner { entries, pending: 0 }),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self { path: None, flush_every: usize::MAX, inner: Mutex::new(Inner::default()) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, path: &str) -> Option<ChecksumEntry> {
        self.lock().entries.get(path).cloned()
    }

    pub fn is_unchanged(&self, path: &str, checksum: &str) -> bool {
        self.lock().entries.get(path).is_some_and(|e| e.checksum == checksum)
    }

    /// Record `entry` for `path`. If the write-through to disk fails the
    /// previous entry is restored, so memory never runs ahead of the file.
    pub fn put(&self, path: &str, entry: ChecksumEntry) -> Result<()> {
        let mut inner = self.lock();
        let previous = inner.entries.insert(path.to_string(), entry);
        if let Err(e) = self.note_mutation(&mut inner) {
            restore(&mut inner, path, previous);
            return Err(e);
        }
        Ok(())
    }

    pub fn remove(&self, path: &str) -> Result<Option<ChecksumEntry>> {
        let mut inner = self.lock();
        let removed = inner.entries.remove(path);
        if removed.is_some() {
            if let Err(e) = self.note_mutation(&mut inner) {
                restore(&mut inner, path, removed);
                return Err(e);
            }
        }
        Ok(removed)
    }

    /// Drop every entry and persist immediately.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.entries.clear();
        self.write(&mut inner)
    }

    pub fn flush(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.pending == 0 {
            return Ok(());
        }
        self.write(&mut inner)
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, ChecksumEntry)> {
        self.lock().entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn note_mutation(&self, inner: &mut Inner) -> Result<()> {
        inner.pending += 1;
        if inner.pending >= self.flush_every {
            self.write(inner)?;
        }
        Ok(())
    }

    fn write(&self, inner: &mut Inner) -> Result<()> {
        let Some(path) = &self.path else {
            inner.pending = 0;
            return Ok(());
        };
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let snapshot = Snapshot { version: FORMAT_VERSION, entries: inner.entries.clone() };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &snapshot)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!(path = %path.display(), entries = inner.entries.len(), "checksum store flushed");
        inner.pending = 0;
        Ok(())
    }
}

fn restore(inner: &mut Inner, path: &str, previous: Option<ChecksumEntry>) {
    match previous {
        Some(entry) => inner.entries.insert(path.to_string(), entry),
        None => inner.entries.remove(path),
    };
    inner.pending = inner.pending.saturating_sub(1);
}
