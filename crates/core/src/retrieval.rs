//! Vector retrieval over the internal corpus.
//!
//! [`CorpusIndex`] is the external similarity index; [`VectorRetriever`] is
//! the contract the orchestrator consumes, adding validation, exclusion,
//! thresholding and ranking on top of the raw index.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{IndexError, RetrievalFailure};
use crate::evidence::{ChunkId, EvidenceChunk};
use crate::round::RoundFilters;

/// A retrieval request for one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// Query embedding first, then image embeddings
    pub embeddings: Vec<Vec<f32>>,

    /// Chunk ids that must not be returned
    #[serde(default)]
    pub exclude: HashSet<ChunkId>,

    #[serde(default)]
    pub filters: RoundFilters,

    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    20
}

impl RetrievalRequest {
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        Self {
            embeddings,
            exclude: HashSet::new(),
            filters: RoundFilters::default(),
            max_results: default_max_results(),
        }
    }

    pub fn excluding(mut self, exclude: HashSet<ChunkId>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_filters(mut self, filters: RoundFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Check the input constraints of the retrieval contract.
    pub fn validate(&self) -> Result<(), RetrievalFailure> {
        if self.embeddings.is_empty() {
            return Err(RetrievalFailure::Malformed("no embeddings supplied".into()));
        }
        if self.max_results == 0 {
            return Err(RetrievalFailure::Malformed("max_results must be > 0".into()));
        }
        let dim = self.embeddings[0].len();
        if dim == 0 {
            return Err(RetrievalFailure::Malformed("empty embedding vector".into()));
        }
        if let Some(bad) = self.embeddings.iter().position(|e| e.len() != dim) {
            return Err(RetrievalFailure::Malformed(format!(
                "embedding {bad} has dimension {}, expected {dim}",
                self.embeddings[bad].len()
            )));
        }
        if self.embeddings.iter().flatten().any(|x| !x.is_finite()) {
            return Err(RetrievalFailure::Malformed("embedding contains non-finite values".into()));
        }
        if !self.filters.is_valid() {
            return Err(RetrievalFailure::Malformed("start_date is after end_date".into()));
        }
        Ok(())
    }
}

/// What a retriever hands back.
///
/// `degraded` is set when the index could not be queried; `chunks` is then
/// empty and the round proceeds without corpus evidence.
#[derive(Debug, Clone, Default)]
pub struct Retrieved {
    pub chunks: Vec<EvidenceChunk>,
    pub degraded: Option<String>,
}

impl Retrieved {
    pub fn chunks(chunks: Vec<EvidenceChunk>) -> Self {
        Self {
            chunks,
            degraded: None,
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            chunks: Vec::new(),
            degraded: Some(reason.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// The external similarity index over the corpus.
#[async_trait]
pub trait CorpusIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Return up to `limit` chunks nearest to `embedding` that pass
    /// `filters`, with `score` set to their similarity.
    async fn nearest(
        &self,
        embedding: &[f32],
        filters: &RoundFilters,
        limit: usize,
    ) -> Result<Vec<EvidenceChunk>, IndexError>;

    /// Return up to `limit` chunks passing `filters`, most recent first.
    async fn latest(&self, filters: &RoundFilters, limit: usize) -> Result<Vec<EvidenceChunk>, IndexError>;
}

/// Ranked, thresholded, exclusion-aware retrieval.
///
/// Guarantees: results sorted by descending score, every score at or above
/// the configured threshold, no excluded id, at most `max_results` entries.
/// An unreachable index yields an empty, degraded result, never an error.
#[async_trait]
pub trait VectorRetriever: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Retrieved, RetrievalFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_embeddings_rejected() {
        let err = RetrievalRequest::new(vec![]).validate().unwrap_err();
        assert!(err.to_string().contains("no embeddings"));
    }

    #[test]
    fn zero_max_results_rejected() {
        let req = RetrievalRequest::new(vec![vec![1.0]]).with_max_results(0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn mismatched_dimensions_rejected() {
        let req = RetrievalRequest::new(vec![vec![1.0, 0.0], vec![1.0]]);
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[test]
    fn nan_rejected() {
        let req = RetrievalRequest::new(vec![vec![f32::NAN, 1.0]]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn well_formed_request_accepted() {
        let req = RetrievalRequest::new(vec![vec![1.0, 0.0], vec![0.5, 0.5]]).with_max_results(5);
        assert!(req.validate().is_ok());
    }
}
