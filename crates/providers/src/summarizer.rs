//! Summarizers: condense a query and its evidence into markdown.

use async_trait::async_trait;
use deepdive_core::error::SummaryError;
use deepdive_core::evidence::EvidenceChunk;
use deepdive_core::message::Message;
use deepdive_core::provider::{Provider, ProviderRequest};
use deepdive_core::summary::{NO_EVIDENCE_SUMMARY, Summarizer};
use std::sync::Arc;
use tracing::debug;

use crate::prompt;

const SUMMARIZER_SYSTEM_PROMPT: &str = "You are an economics research analyst. Answer the question \
using only the numbered evidence provided. Write concise markdown, cite evidence as [n], and say \
plainly when the evidence does not settle the question.";

/// Summarizes through a chat-completion model.
pub struct LlmSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn summarize(&self, query: &str, evidence: &[EvidenceChunk]) -> Result<String, SummaryError> {
        if evidence.is_empty() {
            return Ok(NO_EVIDENCE_SUMMARY.to_string());
        }

        let messages = vec![
            Message::system(SUMMARIZER_SYSTEM_PROMPT),
            Message::user(format!(
                "Question: {query}\n\nEvidence:\n{}",
                prompt::render_evidence(evidence)
            )),
        ];
        let request = ProviderRequest::new(&self.model, messages).with_temperature(self.temperature);

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| SummaryError::Unavailable(e.to_string()))?;

        let summary = response.message.content.trim().to_string();
        if summary.is_empty() {
            return Err(SummaryError::Unavailable("model returned an empty summary".into()));
        }
        debug!(model = %response.model, chars = summary.len(), "Summary generated");
        Ok(summary)
    }
}

/// Offline summarizer: a markdown digest of the evidence, newest first.
///
/// Used when no API key is configured, and in tests.
pub struct DigestSummarizer {
    max_items: usize,
}

impl DigestSummarizer {
    pub fn new(max_items: usize) -> Self {
        Self { max_items }
    }
}

impl Default for DigestSummarizer {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl Summarizer for DigestSummarizer {
    fn name(&self) -> &str {
        "digest"
    }

    async fn summarize(&self, query: &str, evidence: &[EvidenceChunk]) -> Result<String, SummaryError> {
        if evidence.is_empty() {
            return Ok(NO_EVIDENCE_SUMMARY.to_string());
        }

        let mut out = format!("### {query}\n\n");
        for chunk in evidence.iter().take(self.max_items) {
            let source = if chunk.source.is_empty() { "unknown" } else { chunk.source.as_str() };
            out.push_str(&format!(
                "- **{source}**: {}\n",
                prompt::preview(&chunk.payload.render().replace('\n', " "), 200)
            ));
        }
        if evidence.len() > self.max_items {
            out.push_str(&format!("\n_{} more items not shown._\n", evidence.len() - self.max_items));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, make_text_response};

    #[tokio::test]
    async fn empty_evidence_short_circuits() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let summarizer = LlmSummarizer::new(provider.clone(), "m", 0.2);
        assert_eq!(summarizer.summarize("q", &[]).await.unwrap(), NO_EVIDENCE_SUMMARY);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn llm_summary_is_trimmed() {
        let provider = Arc::new(ScriptedProvider::new(vec![make_text_response(
            "  Inflation cooled to 2.4% [1].\n",
        )]));
        let summarizer = LlmSummarizer::new(provider, "m", 0.2);
        let evidence = vec![EvidenceChunk::text("a", "CPI 2.4% y/y")];
        assert_eq!(
            summarizer.summarize("inflation?", &evidence).await.unwrap(),
            "Inflation cooled to 2.4% [1]."
        );
    }

    #[tokio::test]
    async fn provider_failure_is_error() {
        let summarizer = LlmSummarizer::new(Arc::new(ScriptedProvider::failing()), "m", 0.2);
        let evidence = vec![EvidenceChunk::text("a", "A")];
        assert!(summarizer.summarize("q", &evidence).await.is_err());
    }

    #[tokio::test]
    async fn digest_lists_sources_and_caps_items() {
        let evidence: Vec<_> = (0..3)
            .map(|i| EvidenceChunk::text(format!("c{i}"), format!("item {i}")).with_source("fed"))
            .collect();
        let out = DigestSummarizer::new(2).summarize("rates", &evidence).await.unwrap();
        assert!(out.starts_with("### rates"));
        assert!(out.contains("- **fed**: item 0"));
        assert!(!out.contains("item 2"));
        assert!(out.contains("1 more items not shown"));
    }
}
