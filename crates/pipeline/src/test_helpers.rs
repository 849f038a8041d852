//! Shared test helpers: scripted collaborators for orchestrator tests.

use async_trait::async_trait;
use deepdive_core::embedding::Embedder;
use deepdive_core::error::{EmbeddingError, EvaluationDegraded, RetrievalFailure, StoreError, SummaryError};
use deepdive_core::evidence::{ChunkId, EvidenceChunk};
use deepdive_core::retrieval::{RetrievalRequest, Retrieved, VectorRetriever};
use deepdive_core::round::QueryRound;
use deepdive_core::store::{EvidenceStore, SaveRound};
use deepdive_core::summary::Summarizer;
use deepdive_core::tool::{ExecutionBatch, ToolCall, ToolCallState, ToolEvaluator, ToolExecutor};
use deepdive_core::upload::{Upload, UploadStatus};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// A corpus chunk with a fixed id.
pub fn chunk(id: &str) -> EvidenceChunk {
    EvidenceChunk::text(id, format!("evidence {id}")).with_score(0.9)
}

pub fn chunks(ids: &[&str]) -> Vec<EvidenceChunk> {
    ids.iter().map(|id| chunk(id)).collect()
}

pub fn ids(chunks: &[EvidenceChunk]) -> Vec<&str> {
    chunks.iter().map(|c| c.id.as_str()).collect()
}

pub fn call(name: &str) -> ToolCall {
    ToolCall::pending(name, serde_json::json!({}))
}

// ── Embedder ─────────────────────────────────────────────────────────────

/// Returns the same vector for every input.
pub struct StaticEmbedder {
    vector: Vec<f32>,
    fail: bool,
    calls: Mutex<usize>,
}

impl StaticEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            fail: false,
            calls: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![])
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    fn name(&self) -> &str {
        "static"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(EmbeddingError::Unavailable("embedding service down".into()));
        }
        Ok(self.vector.clone())
    }
}

// ── Retriever ────────────────────────────────────────────────────────────

/// Returns a fixed chunk list, honouring the request's exclusion set, and
/// records every request it receives.
pub struct ScriptedRetriever {
    corpus: Vec<EvidenceChunk>,
    degraded: Option<String>,
    requests: Mutex<Vec<RetrievalRequest>>,
}

impl ScriptedRetriever {
    pub fn new(corpus: Vec<EvidenceChunk>) -> Self {
        Self {
            corpus,
            degraded: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A retriever whose index is unreachable.
    pub fn unreachable() -> Self {
        Self {
            degraded: Some("index offline".into()),
            ..Self::new(vec![])
        }
    }

    pub fn requests(&self) -> Vec<RetrievalRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorRetriever for ScriptedRetriever {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Retrieved, RetrievalFailure> {
        request.validate()?;
        self.requests.lock().unwrap().push(request.clone());
        if let Some(reason) = &self.degraded {
            return Ok(Retrieved::degraded(reason.clone()));
        }
        Ok(Retrieved::chunks(
            self.corpus
                .iter()
                .filter(|c| !request.exclude.contains(&c.id))
                .take(request.max_results)
                .cloned()
                .collect(),
        ))
    }
}

// ── Evaluator ────────────────────────────────────────────────────────────

/// Returns one scripted answer per call, then nothing.
pub struct ScriptedEvaluator {
    answers: Mutex<Vec<Result<Vec<ToolCall>, EvaluationDegraded>>>,
    seen: Mutex<Vec<(Vec<ChunkId>, usize)>>,
}

impl ScriptedEvaluator {
    pub fn new(answers: Vec<Result<Vec<ToolCall>, EvaluationDegraded>>) -> Self {
        Self {
            answers: Mutex::new(answers),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn silent() -> Self {
        Self::new(vec![])
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// (evidence ids, existing call count) per evaluation.
    pub fn seen(&self) -> Vec<(Vec<ChunkId>, usize)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolEvaluator for ScriptedEvaluator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn evaluate(
        &self,
        _query: &str,
        evidence: &[EvidenceChunk],
        existing_calls: &[ToolCall],
    ) -> Result<Vec<ToolCall>, EvaluationDegraded> {
        self.seen.lock().unwrap().push((
            evidence.iter().map(|c| c.id.clone()).collect(),
            existing_calls.len(),
        ));
        let mut answers = self.answers.lock().unwrap();
        if answers.is_empty() {
            return Ok(Vec::new());
        }
        answers.remove(0)
    }
}

// ── Executor ─────────────────────────────────────────────────────────────

/// Executes calls by tool name from a fixed table. Names missing from the
/// table fail.
pub struct TableExecutor {
    table: HashMap<String, Vec<EvidenceChunk>>,
    batches: Mutex<usize>,
    cancel_during: Option<CancellationToken>,
}

impl TableExecutor {
    pub fn new(table: Vec<(&str, Vec<EvidenceChunk>)>) -> Self {
        Self {
            table: table.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            batches: Mutex::new(0),
            cancel_during: None,
        }
    }

    /// Cancel `token` while the batch is in flight.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_during = Some(token);
        self
    }

    pub fn batches(&self) -> usize {
        *self.batches.lock().unwrap()
    }
}

#[async_trait]
impl ToolExecutor for TableExecutor {
    async fn execute(&self, calls: Vec<ToolCall>, exclude: &HashSet<ChunkId>) -> ExecutionBatch {
        *self.batches.lock().unwrap() += 1;
        if let Some(token) = &self.cancel_during {
            token.cancel();
        }

        let mut seen = exclude.clone();
        let mut batch = ExecutionBatch::default();
        for mut call in calls {
            if call.is_executed() {
                batch.calls.push(call);
                continue;
            }
            match self.table.get(&call.name) {
                Some(found) => {
                    let fresh: Vec<EvidenceChunk> =
                        found.iter().filter(|c| seen.insert(c.id.clone())).cloned().collect();
                    call.evidence_ids = fresh.iter().map(|c| c.id.clone()).collect();
                    call.state = ToolCallState::Executed;
                    batch.evidence.extend(fresh);
                }
                None => {
                    call.state = ToolCallState::Failed {
                        reason: format!("no such tool: {}", call.name),
                    };
                }
            }
            batch.calls.push(call);
        }
        batch
    }
}

// ── Summarizer ───────────────────────────────────────────────────────────

/// Summarizes as "<n> chunks: <ids>"; optionally fails.
pub struct CountingSummarizer {
    fail: bool,
}

impl CountingSummarizer {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    fn name(&self) -> &str {
        "counting"
    }

    async fn summarize(&self, _query: &str, evidence: &[EvidenceChunk]) -> Result<String, SummaryError> {
        if self.fail {
            return Err(SummaryError::Unavailable("summarizer down".into()));
        }
        Ok(format!("{} chunks: {}", evidence.len(), ids(evidence).join(",")))
    }
}

// ── Store ────────────────────────────────────────────────────────────────

/// Delegates to an inner store but refuses every round save.
pub struct FailingSaveStore {
    inner: Arc<dyn EvidenceStore>,
}

impl FailingSaveStore {
    pub fn new(inner: Arc<dyn EvidenceStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EvidenceStore for FailingSaveStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn create_upload(&self, upload: Upload) -> Result<String, StoreError> {
        self.inner.create_upload(upload).await
    }

    async fn get_upload(&self, upload_id: &str) -> Result<Option<Upload>, StoreError> {
        self.inner.get_upload(upload_id).await
    }

    async fn save_round(&self, _upload_id: &str, _round: SaveRound) -> Result<(), StoreError> {
        Err(StoreError::Persistence("disk full".into()))
    }

    async fn set_status(&self, upload_id: &str, status: UploadStatus) -> Result<(), StoreError> {
        self.inner.set_status(upload_id, status).await
    }

    async fn set_suggested_queries(&self, upload_id: &str, suggestions: Vec<QueryRound>) -> Result<(), StoreError> {
        self.inner.set_suggested_queries(upload_id, suggestions).await
    }

    async fn list_uploads(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list_uploads(user_id).await
    }
}
