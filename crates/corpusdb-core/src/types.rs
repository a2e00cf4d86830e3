//! Domain types shared by the chunker, both index adapters and the engine.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// One metadata value, or the explicit `unknown` sentinel.
///
/// Known values are trimmed and lowercased so filters compare exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tag {
    Known(String),
    #[default]
    Unknown,
}

impl Tag {
    pub const SENTINEL: &'static str = "unknown";

    pub fn new(value: impl AsRef<str>) -> Self {
        let v = value.as_ref().trim().to_lowercase();
        if v.is_empty() || v == Self::SENTINEL {
            Self::Unknown
        } else {
            Self::Known(v)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(v) => v,
            Self::Unknown => Self::SENTINEL,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Keep `self` if known, otherwise evaluate `fallback`.
    pub fn or_else(self, fallback: impl FnOnce() -> Tag) -> Tag {
        if self.is_known() { self } else { fallback() }
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.as_str().to_string()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse document class; selects the chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    #[default]
    Prose,
    StructuredMarkup,
    SourceCode,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prose => "prose",
            Self::StructuredMarkup => "structured_markup",
            Self::SourceCode => "source_code",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prose" => Some(Self::Prose),
            "structured_markup" => Some(Self::StructuredMarkup),
            "source_code" => Some(Self::SourceCode),
            _ => None,
        }
    }

    /// Source code and structured markup share the line-oriented strategy.
    pub fn is_source_like(self) -> bool {
        !matches!(self, Self::Prose)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-shape metadata carried by every chunk and every checksum entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub technology: Tag,
    pub component: Tag,
    pub topic: Tag,
    pub version: Tag,
    pub file_kind: FileKind,
    pub source_path: String,
}

/// A source file as read by the scanner.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// Corpus root the file was discovered under.
    pub root: PathBuf,
    pub text: String,
    pub kind: FileKind,
    pub checksum: String,
}

impl SourceDocument {
    pub fn path_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// A retrieval-sized span of a source document.
///
/// - `id`: deterministic id from source path, ordinal and text
/// - `text`: exactly `source[byte_range.0..byte_range.1]`
/// - `line_range`: 1-based inclusive line numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source_path: String,
    pub ordinal: usize,
    pub text: String,
    pub byte_range: (usize, usize),
    pub line_range: (usize, usize),
    pub metadata: ChunkMetadata,
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Keyword,
}

/// The minimal surface returned by both index services.
///
/// `id` matches `Chunk::id`. `score` is engine-specific but higher is always
/// better. Text and metadata are the stored projection of the chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Structured filters applied by both indices and re-checked after retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub technology: Option<String>,
    pub component: Option<String>,
}

impl SearchFilters {
    pub fn technology(mut self, technology: impl AsRef<str>) -> Self {
        self.technology = Some(technology.as_ref().trim().to_lowercase());
        self
    }

    pub fn component(mut self, component: impl AsRef<str>) -> Self {
        self.component = Some(component.as_ref().trim().to_lowercase());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.technology.is_none() && self.component.is_none()
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        let ok = |want: &Option<String>, have: &Tag| {
            want.as_deref().map_or(true, |w| w.eq_ignore_ascii_case(have.as_str()))
        };
        ok(&self.technology, &meta.technology) && ok(&self.component, &meta.component)
    }
}

/// One row of a fused ranking. Raw scores are absent for the side that did
/// not retrieve the chunk; normalized scores are 0.0 in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub keyword_raw: Option<f32>,
    pub vector_raw: Option<f32>,
    pub keyword_norm: f32,
    pub vector_norm: f32,
    pub score: f32,
}

/// Which side of a hybrid search was unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "side", content = "reason", rename_all = "snake_case")]
pub enum Degradation {
    KeywordUnavailable(String),
    VectorUnavailable(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<FusedResult>,
    pub degraded: Option<Degradation>,
}

impl SearchResponse {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_normalizes_and_round_trips_sentinel() {
        assert_eq!(Tag::new("  Rust "), Tag::Known("rust".into()));
        assert_eq!(Tag::new(""), Tag::Unknown);
        assert_eq!(Tag::new("UNKNOWN"), Tag::Unknown);
        let json = serde_json::to_string(&Tag::Unknown).expect("ser");
        assert_eq!(json, "\"unknown\"");
        let back: Tag = serde_json::from_str(&json).expect("de");
        assert_eq!(back, Tag::Unknown);
    }

    #[test]
    fn filters_match_case_insensitively() {
        let meta = ChunkMetadata {
            technology: Tag::new("kubernetes"),
            component: Tag::new("ingress"),
            ..Default::default()
        };
        assert!(SearchFilters::default().matches(&meta));
        assert!(SearchFilters::default().technology("Kubernetes").matches(&meta));
        assert!(!SearchFilters::default().technology("docker").matches(&meta));
        assert!(!SearchFilters::default().technology("kubernetes").component("service").matches(&meta));
    }
}
