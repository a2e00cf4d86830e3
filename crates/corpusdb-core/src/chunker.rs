//! Splits documents into overlapping retrieval units.
//!
//! Prose is packed from whitespace-delimited words, preferring to end a chunk
//! at a sentence or paragraph boundary. Source code and structured markup are
//! packed from whole lines, preferring blank-line or indentation-reset block
//! starts and falling back to fixed `max_lines` windows.
//!
//! Units partition the text: every byte belongs to some unit, so consecutive
//! chunks either touch or overlap and together cover the whole document.

use crate::config::ChunkingSettings;
use crate::types::{Chunk, ChunkId, ChunkMetadata};

/// Deterministic chunk id: first 32 hex chars of
/// `blake3(path ‖ 0 ‖ ordinal ‖ 0 ‖ text)`.
pub fn chunk_id(path: &str, ordinal: usize, text: &str) -> ChunkId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(path.as_bytes());
    hasher.update(&[0]);
    hasher.update(ordinal.to_string().as_bytes());
    hasher.update(&[0]);
    hasher.update(text.as_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..32].to_string()
}

#[derive(Debug, Clone)]
pub struct Chunker {
    settings: ChunkingSettings,
}

impl Chunker {
    pub fn new(settings: ChunkingSettings) -> Self {
        Self { settings }
    }

    /// Lazily chunk `text`. The strategy follows `meta.file_kind`; the
    /// iterator can be cloned to restart from the current position.
    pub fn chunks<'a>(&self, path: &'a str, text: &'a str, meta: &'a ChunkMetadata) -> Chunks<'a> {
        let s = &self.settings;
        let (units, strategy) = if meta.file_kind.is_source_like() {
            (
                line_units(text),
                Strategy::Lines { min: s.min_lines.max(1), max: s.max_lines.max(1), overlap: s.overlap_lines },
            )
        } else {
            (word_units(text), Strategy::Prose { target: s.target_tokens.max(1), overlap: s.overlap_tokens })
        };
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Chunks {
            path,
            text,
            meta,
            next: if units.is_empty() { None } else { Some(0) },
            units,
            line_starts,
            strategy,
            ordinal: 0,
        }
    }

    pub fn chunk_all(&self, path: &str, text: &str, meta: &ChunkMetadata) -> Vec<Chunk> {
        self.chunks(path, text, meta).collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Unit {
    start: usize,
    end: usize,
    /// A chunk may end after this unit.
    boundary: bool,
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    Prose { target: usize, overlap: usize },
    Lines { min: usize, max: usize, overlap: usize },
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    path: &'a str,
    text: &'a str,
    meta: &'a ChunkMetadata,
    units: Vec<Unit>,
    line_starts: Vec<usize>,
    strategy: Strategy,
    next: Option<usize>,
    ordinal: usize,
}

impl Chunks<'_> {
    /// End (exclusive unit index) of the chunk starting at `i`, and where the
    /// following chunk starts.
    fn plan(&self, i: usize) -> (usize, Option<usize>) {
        let n = self.units.len();
        match self.strategy {
            Strategy::Prose { target, overlap } => {
                let j_max = (i + target).min(n);
                if j_max == n {
                    return (n, None);
                }
                let lower = i + (overlap + 1).max(target / 2);
                let j = (lower..=j_max).rev().find(|&e| self.units[e - 1].boundary).unwrap_or(j_max);
                (j, Some(j.saturating_sub(overlap).max(i + 1)))
            }
            Strategy::Lines { min, max, overlap } => {
                if n - i <= max {
                    return (n, None);
                }
                let upper = i + max;
                let e = (i + min..=upper).rev().find(|&e| self.units[e - 1].boundary).unwrap_or(upper);
                (e, Some(e.saturating_sub(overlap).max(i + 1)))
            }
        }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&s| s <= offset)
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let i = self.next?;
        let (j, following) = self.plan(i);
        self.next = following;

        let start = self.units[i].start;
        let end = self.units[j - 1].end;
        let text = &self.text[start..end];
        let ordinal = self.ordinal;
        self.ordinal += 1;

        Some(Chunk {
            id: chunk_id(self.path, ordinal, text),
            source_path: self.path.to_string(),
            ordinal,
            text: text.to_string(),
            byte_range: (start, end),
            line_range: (self.line_of(start), self.line_of(end.saturating_sub(1).max(start))),
            metadata: self.meta.clone(),
        })
    }
}

/// Words with their trailing whitespace; the first unit also absorbs any
/// leading whitespace.
fn word_units(text: &str) -> Vec<Unit> {
    let mut starts = Vec::new();
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            starts.push(i);
            in_word = true;
        }
    }
    let mut units = Vec::with_capacity(starts.len());
    for (k, &s) in starts.iter().enumerate() {
        let end = starts.get(k + 1).copied().unwrap_or(text.len());
        let span = &text[s..end];
        let word = span.trim_end();
        let gap = &span[word.len()..];
        let sentence_end = word
            .trim_end_matches(['"', '\'', ')', ']', '*', '_'])
            .ends_with(['.', '!', '?', ':']);
        let paragraph_end = gap.matches('\n').count() >= 2;
        units.push(Unit {
            start: if k == 0 { 0 } else { s },
            end,
            boundary: sentence_end || paragraph_end || k + 1 == starts.len(),
        });
    }
    units
}

/// Whole lines including their newline. Empty for whitespace-only text.
fn line_units(text: &str) -> Vec<Unit> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut units = Vec::with_capacity(lines.len());
    let mut offset = 0;
    for (k, line) in lines.iter().enumerate() {
        let end = offset + line.len();
        let boundary = lines.get(k + 1).map_or(true, |next| starts_block(line, next));
        units.push(Unit { start: offset, end, boundary });
        offset = end;
    }
    units
}

/// Whether `next` opens a new top-level block after `prev`.
fn starts_block(prev: &str, next: &str) -> bool {
    let n = next.trim_end();
    if n.is_empty() || n.starts_with(char::is_whitespace) || n.starts_with(['}', ')', ']']) {
        return false;
    }
    let p = prev.trim_end();
    p.is_empty() || p.starts_with(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileKind;

    fn settings(target: usize, overlap: usize) -> ChunkingSettings {
        ChunkingSettings { target_tokens: target, overlap_tokens: overlap, min_lines: 3, max_lines: 10, overlap_lines: 2 }
    }

    fn meta(kind: FileKind) -> ChunkMetadata {
        ChunkMetadata { file_kind: kind, ..Default::default() }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn assert_covers(text: &str, chunks: &[Chunk]) {
        assert_eq!(chunks.first().map(|c| c.byte_range.0), Some(0));
        assert_eq!(chunks.last().map(|c| c.byte_range.1), Some(text.len()));
        for pair in chunks.windows(2) {
            assert!(pair[1].byte_range.0 <= pair[0].byte_range.1, "gap between chunks");
            assert!(pair[1].byte_range.0 > pair[0].byte_range.0, "no progress");
        }
        for c in chunks {
            assert_eq!(c.text, &text[c.byte_range.0..c.byte_range.1]);
        }
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let text = words(50);
        let m = meta(FileKind::Prose);
        let chunks = Chunker::new(settings(300, 50)).chunk_all("a.md", &text, &m);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].line_range, (1, 1));
    }

    #[test]
    fn blank_document_yields_nothing() {
        let chunker = Chunker::new(settings(300, 50));
        assert!(chunker.chunk_all("a.md", "  \n\n\t ", &meta(FileKind::Prose)).is_empty());
        assert!(chunker.chunk_all("a.rs", "\n\n", &meta(FileKind::SourceCode)).is_empty());
    }

    #[test]
    fn long_prose_covers_document_with_overlap() {
        let text = words(5000);
        let m = meta(FileKind::Prose);
        let chunks = Chunker::new(settings(300, 50)).chunk_all("b.md", &text, &m);
        assert!(chunks.len() > 1);
        assert_covers(&text, &chunks);
        for c in &chunks {
            assert!(c.text.split_whitespace().count() <= 300);
        }
        let first: Vec<&str> = chunks[0].text.split_whitespace().collect();
        let second: Vec<&str> = chunks[1].text.split_whitespace().collect();
        assert_eq!(&first[first.len() - 50..], &second[..50]);
    }

    #[test]
    fn prose_prefers_sentence_boundaries() {
        let sentence = format!("{}.", words(40));
        let text = vec![sentence; 20].join(" ");
        let m = meta(FileKind::Prose);
        let chunks = Chunker::new(settings(100, 10)).chunk_all("c.md", &text, &m);
        assert_covers(&text, &chunks);
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.text.trim_end().ends_with('.'), "chunk should end at a sentence: {:?}", c.text);
        }
    }

    #[test]
    fn rechunking_is_idempotent() {
        let text = words(1234);
        let m = meta(FileKind::Prose);
        let chunker = Chunker::new(settings(200, 20));
        let a = chunker.chunk_all("d.md", &text, &m);
        let b = chunker.chunk_all("d.md", &text, &m);
        assert_eq!(a, b);

        let iter = chunker.chunks("d.md", &text, &m);
        let restarted: Vec<Chunk> = iter.clone().collect();
        assert_eq!(restarted, iter.collect::<Vec<_>>());
    }

    #[test]
    fn chunk_ids_depend_on_path_ordinal_and_text() {
        let base = chunk_id("a.md", 0, "hello");
        assert_eq!(base.len(), 32);
        assert_eq!(base, chunk_id("a.md", 0, "hello"));
        assert_ne!(base, chunk_id("b.md", 0, "hello"));
        assert_ne!(base, chunk_id("a.md", 1, "hello"));
        assert_ne!(base, chunk_id("a.md", 0, "hullo"));
    }

    #[test]
    fn source_without_breaks_uses_fixed_windows() {
        let text: String = (0..25).map(|i| format!("let x{i} = {i};\n")).collect();
        let m = meta(FileKind::SourceCode);
        let chunks = Chunker::new(settings(300, 50)).chunk_all("a.rs", &text, &m);
        assert_covers(&text, &chunks);
        assert_eq!(chunks[0].line_range, (1, 10));
        assert_eq!(chunks[1].line_range, (9, 18));
    }

    #[test]
    fn source_ends_chunks_at_blocks_and_keeps_line_overlap() {
        let block = |name: &str| format!("fn {name}() {{\n    one();\n    two();\n}}\n\n");
        let text: String = ["a", "b", "c", "d", "e"].iter().map(|n| block(*n)).collect();
        let m = meta(FileKind::SourceCode);
        let chunks = Chunker::new(settings(300, 50)).chunk_all("a.rs", &text, &m);
        assert_covers(&text, &chunks);
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].line_range, (1, 10));
        assert_eq!(chunks[1].line_range, (9, 15));
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.text.ends_with("}\n\n"), "chunk should end after a block: {:?}", c.text);
        }
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].line_range.0 + 1, pair[0].line_range.1, "two shared lines");
            let prev: Vec<&str> = pair[0].text.split_inclusive('\n').collect();
            let next: Vec<&str> = pair[1].text.split_inclusive('\n').collect();
            assert_eq!(&prev[prev.len() - 2..], &next[..2]);
        }
    }

    #[test]
    fn oversized_line_is_not_truncated() {
        let line = "x".repeat(10_000);
        let m = meta(FileKind::StructuredMarkup);
        let chunks = Chunker::new(settings(300, 50)).chunk_all("a.json", &line, &m);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text.len(), 10_000);
    }
}
