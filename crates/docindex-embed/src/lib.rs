//! Embedding capabilities for docindex.
//!
//! Respects `APP_USE_FAKE_EMBEDDINGS=1` to switch to the hash embedder for fast
//! and deterministic outputs in tests and development.

use anyhow::{anyhow, bail, Result};
use std::sync::Arc;

use docindex_core::config::{EmbedderKind, EmbedderSettings};
use docindex_core::traits::Embedder;

pub mod device;
pub mod hash;
pub mod minilm;

pub use hash::HashEmbedder;
pub use minilm::{mean_pool_l2, MiniLmEmbedder};

pub fn get_default_embedder(settings: &EmbedderSettings) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake || settings.kind == EmbedderKind::Hash {
        if settings.dim == 0 { bail!("embedder.dim must be at least 1 for the hash embedder"); }
        tracing::info!(dim = settings.dim, forced = use_fake, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    let model_dir = settings
        .model_path()
        .ok_or_else(|| anyhow!("embedder.model_dir is required for the minilm embedder"))?;
    Ok(Arc::new(MiniLmEmbedder::load(&model_dir)?))
}
