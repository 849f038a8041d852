//! The deepdive query pipeline.
//!
//! [`QueryOrchestrator`] runs rounds over an upload: retrieval, two bounded
//! evaluate/execute passes, summarization and atomic persistence. Every
//! collaborator is injected as a trait object, so the same orchestrator runs
//! against the SQLite store and OpenAI-compatible services in production and
//! against scripted doubles in tests.

pub mod orchestrator;
pub mod state;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use orchestrator::{PASS_COUNT, QueryOrchestrator, QueryRequest};
pub use state::{DegradedCondition, RoundOutcome, RoundStage, RoundTrace};
