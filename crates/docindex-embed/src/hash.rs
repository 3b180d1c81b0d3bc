use std::hash::{Hash, Hasher};

use anyhow::{bail, Result};
use twox_hash::XxHash64;

use docindex_core::traits::Embedder;

/// Bag-of-tokens embedder: each whitespace token lands in a bucket chosen by
/// its xxHash64, and the result is L2-normalized. Deterministic and free of
/// model files, so tests and offline setups can rebuild indexes with it.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("hash:d{}", dim) }
    }
}

impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dim }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dim == 0 { bail!("hash embedder needs a dimension of at least 1"); }
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        Ok(v)
    }
}
