//! Embedding backends for corpusdb.
//!
//! `EmbeddingModel` runs BGE-M3 through candle; `HashEmbedder` is a
//! deterministic stand-in selected by `embedding.fake = true` or
//! `APP_USE_FAKE_EMBEDDINGS=1`.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use corpusdb_core::config::EmbeddingSettings;
use corpusdb_core::traits::Embedder;

pub mod device;
pub mod hash;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use hash::HashEmbedder;
pub use model::{resolve_model_dir, EmbeddingModel};
pub use pool::masked_mean_l2;

fn fake_requested(settings: &EmbeddingSettings) -> bool {
    settings.fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if fake_requested(settings) {
        info!(dim = settings.dim, "using hashing embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    let dir = resolve_model_dir(settings.model_dir.as_deref())?;
    Ok(Arc::new(EmbeddingModel::load(&dir, settings.max_len)?))
}
