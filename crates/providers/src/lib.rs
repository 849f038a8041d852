//! LLM-backed collaborators for deepdive.
//!
//! The OpenAI-compatible provider implements `deepdive_core::Provider`; the
//! embedder, tool evaluator and summarizer adapters sit on top of any
//! Provider. Offline fallbacks (`NoopEvaluator`, `DigestSummarizer`) need
//! no network access.

pub mod embedder;
pub mod evaluator;
pub mod openai_compat;
pub mod prompt;
pub mod summarizer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use embedder::ProviderEmbedder;
pub use evaluator::{LlmToolEvaluator, NoopEvaluator};
pub use openai_compat::OpenAiCompatProvider;
pub use summarizer::{DigestSummarizer, LlmSummarizer};
