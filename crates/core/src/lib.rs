//! # Deepdive Core
//!
//! Domain types, collaborator traits, and error definitions for the deepdive
//! query pipeline. Every external service the pipeline talks to (corpus
//! index, embedder, tool evaluator, tool executor, summarizer, store) is a
//! trait here; implementations live in their own crates.
//!
//! ## Design Philosophy
//!
//! Collaborators are injected as `Arc<dyn Trait>` handles built once at
//! startup. This enables:
//! - Swapping implementations via configuration
//! - Scripted mock collaborators in tests
//! - Clean dependency graph (all crates depend inward on core)

pub mod embedding;
pub mod error;
pub mod event;
pub mod evidence;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod round;
pub mod store;
pub mod summary;
pub mod tool;
pub mod upload;

// Re-export key types at crate root for ergonomics
pub use embedding::Embedder;
pub use error::{Error, Result};
pub use event::{EventBus, PipelineEvent};
pub use evidence::{ChunkId, ChunkPayload, ChunkType, EvidenceChunk, EvidenceOrigin};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use retrieval::{CorpusIndex, RetrievalRequest, Retrieved, VectorRetriever};
pub use round::{DrillDownRound, QueryRound, RoundFilters, RoundKind, RoundRef};
pub use store::{EvidenceStore, SaveRound};
pub use summary::{NO_EVIDENCE_SUMMARY, Summarizer};
pub use tool::{ExecutionBatch, Tool, ToolCall, ToolCallState, ToolEvaluator, ToolExecutor, ToolRegistry};
pub use upload::{Upload, UploadStatus, UploadedFile};
