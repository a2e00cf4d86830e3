use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy shared by every corpusdb crate.
///
/// Collaborator traits (`Embedder`, `KeywordIndex`, `VectorIndex`) report
/// failures as `anyhow::Error`; the engine converts them into one of these
/// variants at its boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid weight/size/path configuration. Fatal at startup.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A batch write or embedding call failed after bounded retries.
    #[error("{stage} failed after {attempts} attempt(s): {message}")]
    TransientIndex {
        stage: Stage,
        attempts: u32,
        message: String,
    },

    /// A corpus file could not be read or decoded.
    #[error("Cannot read {}: {message}", path.display())]
    CorpusScan { path: PathBuf, message: String },

    /// Both index services failed during a search.
    #[error("Search unavailable: keyword index: {keyword}; vector index: {vector}")]
    SearchUnavailable { keyword: String, vector: String },

    /// Another indexing run (or clear) currently holds the run lock.
    #[error("An indexing run is already in progress")]
    RunInProgress,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which collaborator call a [`Error::TransientIndex`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embed,
    KeywordWrite,
    KeywordDelete,
    VectorWrite,
    VectorDelete,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Embed => "embedding",
            Self::KeywordWrite => "keyword index write",
            Self::KeywordDelete => "keyword index delete",
            Self::VectorWrite => "vector index write",
            Self::VectorDelete => "vector index delete",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
