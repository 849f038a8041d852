//! Embedder backed by a provider's embeddings endpoint.

use async_trait::async_trait;
use deepdive_core::embedding::Embedder;
use deepdive_core::error::EmbeddingError;
use deepdive_core::provider::{EmbeddingRequest, Provider};
use std::sync::Arc;
use tracing::debug;

pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        let vector = response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(EmbeddingError::Empty)?;
        debug!(model = %self.model, dim = vector.len(), "Query embedded");
        Ok(vector)
    }
}
