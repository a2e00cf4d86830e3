//! Shared building blocks for corpusdb.
//!
//! Domain types and collaborator traits, the error taxonomy, layered settings,
//! and the document pipeline leaves: metadata extraction, chunking, checksum
//! tracking and corpus scanning.

pub mod checksum;
pub mod chunker;
pub mod config;
pub mod error;
pub mod metadata;
pub mod scan;
pub mod traits;
pub mod types;

pub use error::{Error, Result, Stage};
