//! In-memory corpus index backed by a JSON-lines file.
//!
//! Each line is a JSON-encoded [`CorpusEntry`]: an evidence chunk plus its
//! embedding. The whole file is loaded at startup and searched with a
//! brute-force cosine scan, which is plenty for corpora of a few hundred
//! thousand chunks.

use async_trait::async_trait;
use deepdive_core::error::IndexError;
use deepdive_core::evidence::EvidenceChunk;
use deepdive_core::retrieval::CorpusIndex;
use deepdive_core::round::RoundFilters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::vector;

/// One indexed chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusEntry {
    #[serde(flatten)]
    pub chunk: EvidenceChunk,

    pub embedding: Vec<f32>,
}

/// A corpus index held entirely in memory.
pub struct InMemoryCorpus {
    entries: Arc<RwLock<Vec<CorpusEntry>>>,
}

impl InMemoryCorpus {
    pub fn new(entries: Vec<CorpusEntry>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Load a corpus from a JSONL file.
    ///
    /// A missing file is an unreachable index. Corrupted lines are skipped.
    pub async fn load(path: &Path) -> Result<Self, IndexError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            IndexError::Unreachable(format!("cannot read corpus {}: {e}", path.display()))
        })?;

        let entries: Vec<CorpusEntry> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<CorpusEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(line = n + 1, error = %e, "Skipping corrupted corpus entry");
                    None
                }
            })
            .collect();

        debug!(path = %path.display(), count = entries.len(), "Corpus loaded");
        Ok(Self::new(entries))
    }

    pub async fn insert(&self, entry: CorpusEntry) {
        self.entries.write().await.push(entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryCorpus {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl CorpusIndex for InMemoryCorpus {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        filters: &RoundFilters,
        limit: usize,
    ) -> Result<Vec<EvidenceChunk>, IndexError> {
        let entries = self.entries.read().await;
        if let Some(first) = entries.first() {
            if first.embedding.len() != embedding.len() {
                return Err(IndexError::QueryFailed(format!(
                    "query dimension {} does not match corpus dimension {}",
                    embedding.len(),
                    first.embedding.len()
                )));
            }
        }
        Ok(vector::vector_search(&entries, embedding, filters, limit))
    }

    async fn latest(&self, filters: &RoundFilters, limit: usize) -> Result<Vec<EvidenceChunk>, IndexError> {
        let entries = self.entries.read().await;
        let mut dated: Vec<EvidenceChunk> = entries
            .iter()
            .filter(|e| e.chunk.published_at.is_some() && filters.accepts(&e.chunk))
            .map(|e| e.chunk.clone())
            .collect();
        dated.sort_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.id.cmp(&b.id)));
        dated.truncate(limit);
        Ok(dated)
    }
}
