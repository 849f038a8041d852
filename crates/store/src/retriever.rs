//! Index-backed VectorRetriever.

use async_trait::async_trait;
use deepdive_core::error::RetrievalFailure;
use deepdive_core::retrieval::{CorpusIndex, RetrievalRequest, Retrieved, VectorRetriever};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::vector;

/// Queries a [`CorpusIndex`] once per embedding and merges the hits.
pub struct IndexRetriever {
    index: Arc<dyn CorpusIndex>,
    min_score: f32,
}

impl IndexRetriever {
    pub fn new(index: Arc<dyn CorpusIndex>, min_score: f32) -> Self {
        Self { index, min_score }
    }
}

#[async_trait]
impl VectorRetriever for IndexRetriever {
    fn name(&self) -> &str {
        self.index.name()
    }

    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Retrieved, RetrievalFailure> {
        request.validate()?;

        // Over-fetch so excluded ids don't starve the result set
        let fetch = request.max_results + request.exclude.len();

        let mut hit_lists = Vec::with_capacity(request.embeddings.len());
        for embedding in &request.embeddings {
            match self.index.nearest(embedding, &request.filters, fetch).await {
                Ok(hits) => hit_lists.push(hits),
                Err(e) => {
                    warn!(index = self.index.name(), error = %e, "Corpus index degraded, continuing without corpus evidence");
                    return Ok(Retrieved::degraded(e.to_string()));
                }
            }
        }

        let mut chunks: Vec<_> = vector::merge_best(hit_lists)
            .into_iter()
            .filter(|c| c.score >= self.min_score && !request.exclude.contains(&c.id))
            .collect();
        chunks.truncate(request.max_results);

        debug!(
            embeddings = request.embeddings.len(),
            excluded = request.exclude.len(),
            count = chunks.len(),
            "Retrieval complete"
        );
        Ok(Retrieved::chunks(chunks))
    }
}
