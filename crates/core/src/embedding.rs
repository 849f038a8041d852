//! Embedding service contract.

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Turns query text into a vector. Identical text should yield
/// near-identical vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
