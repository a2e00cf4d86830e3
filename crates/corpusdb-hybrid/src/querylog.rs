//! Append-only JSONL record of searches. Written, never read back.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use corpusdb_core::types::{ChunkId, SearchFilters, SearchResponse};
use corpusdb_core::Result;

/// How many result ids each log line keeps.
const LOGGED_IDS: usize = 10;

#[derive(Debug, Serialize)]
struct QueryLogLine<'a> {
    timestamp: DateTime<Utc>,
    query: &'a str,
    filters: &'a SearchFilters,
    top_k: usize,
    results: usize,
    top_ids: Vec<&'a ChunkId>,
    degraded: bool,
    elapsed_ms: u64,
}

enum Message {
    Line(String),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Searches only serialize and enqueue; a dedicated thread owns the file.
struct Writer {
    tx: mpsc::UnboundedSender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Writer {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("query log writer panicked");
            }
        }
    }
}

pub struct QueryLog {
    writer: Option<Writer>,
}

impl QueryLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = std::thread::Builder::new()
            .name("corpusdb-query-log".into())
            .spawn(move || write_lines(file, rx))?;
        debug!(path = %path.display(), "query log opened");
        Ok(Self { writer: Some(Writer { tx, handle: Some(handle) }) })
    }

    pub fn disabled() -> Self {
        Self { writer: None }
    }

    /// Queue one line. Failures are logged and swallowed; a broken query
    /// log never fails a search.
    pub fn record(&self, query: &str, filters: &SearchFilters, top_k: usize, response: &SearchResponse, elapsed_ms: u64) {
        let Some(writer) = &self.writer else { return };
        let line = QueryLogLine {
            timestamp: Utc::now(),
            query,
            filters,
            top_k,
            results: response.results.len(),
            top_ids: response.results.iter().take(LOGGED_IDS).map(|r| &r.id).collect(),
            degraded: response.is_degraded(),
            elapsed_ms,
        };
        match serde_json::to_string(&line) {
            Ok(json) => {
                if writer.tx.send(Message::Line(json)).is_err() {
                    warn!("query log writer has stopped");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode query log line"),
        }
    }

    /// Wait until every line queued so far has been written.
    pub async fn flush(&self) {
        let Some(writer) = &self.writer else { return };
        let (done, wait) = oneshot::channel();
        if writer.tx.send(Message::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

fn write_lines(mut file: File, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.blocking_recv() {
        match message {
            Message::Line(json) => {
                if let Err(e) = file.write_all(format!("{json}\n").as_bytes()) {
                    warn!(error = %e, "failed to append to query log");
                }
            }
            Message::Flush(done) => {
                if let Err(e) = file.flush() {
                    warn!(error = %e, "failed to flush query log");
                }
                let _ = done.send(());
            }
            Message::Shutdown => break,
        }
    }
}
