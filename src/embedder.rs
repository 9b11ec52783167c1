use async_trait::async_trait;

use crate::error::{Error, Result};

/// A fixed-length embedding of some text.
///
/// Produced by an [`Embedder`]; a failed embedding is an error, never a
/// zero vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Fail unless this vector has exactly `expected` components.
    pub fn check_dimension(&self, expected: usize) -> Result<()> {
        if self.dimension() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                found: self.dimension(),
            });
        }
        Ok(())
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Turns text into embedding vectors through some external model.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    /// Dimension of every vector this embedder returns.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;
}
