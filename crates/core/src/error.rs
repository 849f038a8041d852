//! Error types for the deepdive domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator has its own error type; the orchestrator decides which
//! of them are fatal for a round and which are absorbed as degraded
//! conditions.

use thiserror::Error;

/// The top-level error type for a query round.
///
/// Only fatal conditions surface here. Degraded conditions (empty
/// retrieval, evaluator unreachable, single tool failures) are absorbed by
/// the orchestrator and never become an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    // --- Retrieval errors ---
    #[error("Retrieval failure: {0}")]
    Retrieval(#[from] RetrievalFailure),

    // --- Embedding errors ---
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    // --- Summarization errors ---
    #[error("Summarization error: {0}")]
    Summary(#[from] SummaryError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Caller-visible lookups ---
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // --- Lifecycle ---
    #[error("Round cancelled before persistence")]
    Cancelled,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Generic text returned to end users for any fatal round failure.
pub const GENERIC_FAILURE_MESSAGE: &str = "Could not process query. Please try again.";

impl Error {
    /// Whether the caller is at fault (the 4xx-equivalent class).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::InvalidRequest(_)
                | Error::Store(StoreError::NotFound(_))
                | Error::Retrieval(RetrievalFailure::Malformed(_))
        )
    }

    /// The message safe to show to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Error::NotFound(what) | Error::Store(StoreError::NotFound(what)) => {
                format!("Not found: {what}")
            }
            Error::InvalidRequest(reason) => format!("Invalid request: {reason}"),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

// --- Bounded context errors ---

/// A malformed retrieval request. Always fatal for the round.
#[derive(Debug, Clone, Error)]
pub enum RetrievalFailure {
    #[error("malformed retrieval request: {0}")]
    Malformed(String),
}

/// The corpus index could not be reached.
///
/// Retrievers translate this into an empty result set and a `warn` log line;
/// it never aborts a round.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("Corpus index unreachable: {0}")]
    Unreachable(String),

    #[error("Corpus index query failed: {0}")]
    QueryFailed(String),
}

/// The tool-evaluation service failed; the round proceeds without new tools.
#[derive(Debug, Clone, Error)]
#[error("Tool evaluation degraded: {reason}")]
pub struct EvaluationDegraded {
    pub reason: String,
}

impl EvaluationDegraded {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding service returned no vector for input")]
    Empty,
}

#[derive(Debug, Clone, Error)]
pub enum SummaryError {
    #[error("Summarization service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
