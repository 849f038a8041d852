//! Summarization service contract.

use async_trait::async_trait;

use crate::error::SummaryError;
use crate::evidence::EvidenceChunk;

/// Text returned when a round ends with no evidence at all.
pub const NO_EVIDENCE_SUMMARY: &str = "_No evidence found for this query._";

/// Condenses a query and its evidence into markdown.
///
/// Must accept an empty evidence list and answer with a "no evidence" style
/// response rather than an error.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(&self, query: &str, evidence: &[EvidenceChunk]) -> Result<String, SummaryError>;
}
