//! corpusdb-text
//!
//! Tantivy-backed keyword index. Chunk text is BM25-scored; metadata fields
//! are exact keywords used for filtering and returned with every hit.
pub mod index;
pub mod tantivy_utils;

pub use index::TantivyKeywordIndex;
