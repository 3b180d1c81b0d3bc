use docindex_core::error::{Error, Result};

/// In-memory, append-only vector index.
///
/// Vectors are addressed by position only; there is no removal. A rebuild
/// produces a fresh value that replaces the persisted one wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, vectors: Vec::new() }
    }

    pub fn with_capacity(dim: usize, capacity: usize) -> Self {
        Self { dim, vectors: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::InvalidInput(format!("vector has {} values, index expects {}", vector.len(), self.dim)));
        }
        self.vectors.push(vector);
        Ok(())
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { self.vectors.len() }

    pub fn is_empty(&self) -> bool { self.vectors.is_empty() }

    pub fn vectors(&self) -> &[Vec<f32>] { &self.vectors }
}
