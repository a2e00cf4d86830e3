//! Hybrid retrieval over the keyword and vector indices.
//!
//! [`CorpusService`] is the entry point: it runs incremental indexing through
//! [`IndexOrchestrator`] and answers queries through [`HybridQueryEngine`].

mod blocking;
pub mod engine;
pub mod fusion;
pub mod orchestrator;
pub mod querylog;
pub mod report;
pub mod retry;
pub mod service;
pub mod writer;

pub use engine::HybridQueryEngine;
pub use fusion::{fuse, min_max_normalize, FusionWeights};
pub use orchestrator::{Collaborators, IndexOrchestrator};
pub use querylog::QueryLog;
pub use report::{
    ClearReport, FileError, IndexReport, IndexScope, IndexStats, Progress, ProgressCallback, RunState, SourceInfo,
};
pub use retry::RetryPolicy;
pub use service::CorpusService;
pub use writer::DualIndexWriter;
