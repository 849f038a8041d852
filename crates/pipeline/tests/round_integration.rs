//! End-to-end rounds over the real collaborators: the in-memory corpus and
//! its retriever, the registry executor with the built-in tools, the digest
//! summarizer and the in-memory and file stores.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use deepdive_config::ToolsConfig;
use deepdive_core::embedding::Embedder;
use deepdive_core::error::{EmbeddingError, EvaluationDegraded};
use deepdive_core::evidence::{EvidenceChunk, EvidenceOrigin};
use deepdive_core::retrieval::CorpusIndex;
use deepdive_core::round::RoundRef;
use deepdive_core::store::EvidenceStore;
use deepdive_core::summary::NO_EVIDENCE_SUMMARY;
use deepdive_core::tool::{ToolCall, ToolEvaluator};
use deepdive_core::upload::{Upload, UploadStatus};
use deepdive_pipeline::{QueryOrchestrator, QueryRequest};
use deepdive_providers::DigestSummarizer;
use deepdive_store::{CorpusEntry, FileStore, InMemoryCorpus, InMemoryStore, IndexRetriever};
use deepdive_tools::{RegistryExecutor, default_registry};
use tokio_util::sync::CancellationToken;

// ── Doubles for the model-backed collaborators ───────────────────────────

/// Every query embeds to the same direction.
struct AxisEmbedder;

#[async_trait::async_trait]
impl Embedder for AxisEmbedder {
    fn name(&self) -> &str {
        "axis"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![1.0, 0.0, 0.0])
    }
}

/// Proposes one scripted batch per evaluation, then nothing.
struct QueuedEvaluator {
    batches: Mutex<Vec<Vec<ToolCall>>>,
}

impl QueuedEvaluator {
    fn new(batches: Vec<Vec<ToolCall>>) -> Self {
        Self {
            batches: Mutex::new(batches),
        }
    }
}

#[async_trait::async_trait]
impl ToolEvaluator for QueuedEvaluator {
    fn name(&self) -> &str {
        "queued"
    }

    async fn evaluate(
        &self,
        _query: &str,
        _evidence: &[EvidenceChunk],
        _existing_calls: &[ToolCall],
    ) -> Result<Vec<ToolCall>, EvaluationDegraded> {
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            return Ok(Vec::new());
        }
        Ok(batches.remove(0))
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

fn entry(id: &str, text: &str, embedding: Vec<f32>, days_ago: i64) -> CorpusEntry {
    CorpusEntry {
        chunk: EvidenceChunk::text(id, text)
            .with_source("fed")
            .with_published_at(Utc::now() - Duration::days(days_ago)),
        embedding,
    }
}

/// Five old chunks close to the query and two recent ones unrelated to it.
fn corpus() -> Arc<InMemoryCorpus> {
    Arc::new(InMemoryCorpus::new(vec![
        entry("c1", "FOMC statement: policy rate held", vec![1.0, 0.0, 0.0], 200),
        entry("c2", "Dot plot shifted lower", vec![1.0, 0.1, 0.0], 201),
        entry("c3", "Core PCE eased", vec![1.0, 0.2, 0.0], 202),
        entry("c4", "Labor market cooling", vec![1.0, 0.3, 0.0], 203),
        entry("c5", "Balance sheet runoff slowed", vec![1.0, 0.4, 0.0], 204),
        entry("r1", "Minutes released yesterday", vec![0.0, 1.0, 0.0], 1),
        entry("r2", "Governor speech on inflation", vec![0.0, 1.0, 0.0], 2),
    ]))
}

fn window_call(days: u64) -> ToolCall {
    ToolCall::pending("corpus_window", serde_json::json!({ "days": days }))
}

fn orchestrator(store: Arc<dyn EvidenceStore>, evaluator: QueuedEvaluator) -> QueryOrchestrator {
    let corpus = corpus();
    let index: Arc<dyn CorpusIndex> = corpus;
    let tools = ToolsConfig {
        timeout_secs: 5,
        sources: Vec::new(),
        corpus_window_days: 30,
    };
    let registry = default_registry(&tools, index.clone()).unwrap();

    QueryOrchestrator::new(
        Arc::new(AxisEmbedder),
        Arc::new(IndexRetriever::new(index, 0.3)),
        Arc::new(evaluator),
        Arc::new(RegistryExecutor::new(
            Arc::new(registry),
            std::time::Duration::from_secs(tools.timeout_secs),
        )),
        Arc::new(DigestSummarizer::default()),
        store,
    )
}

fn ids(chunks: &[EvidenceChunk]) -> Vec<&str> {
    chunks.iter().map(|c| c.id.as_str()).collect()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn top_level_round_with_one_tool_call() {
    let store = Arc::new(InMemoryStore::new());
    let upload_id = store.create_upload(Upload::new("analyst")).await.unwrap();
    let orchestrator = orchestrator(store.clone(), QueuedEvaluator::new(vec![vec![window_call(30)]]));

    let outcome = orchestrator
        .submit_query(
            &upload_id,
            QueryRequest::new("What drove the latest rate decision?"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(ids(&outcome.evidence), vec!["r1", "r2", "c1", "c2", "c3", "c4", "c5"]);
    assert_eq!(
        outcome.evidence[0].origin,
        EvidenceOrigin::External {
            tool: "corpus_window".into()
        }
    );
    assert_eq!(outcome.evidence[2].origin, EvidenceOrigin::Corpus);
    assert!(outcome.summary.contains("Minutes released yesterday"));
    assert!(outcome.tool_calls[0].is_executed());

    let upload = store.get_upload(&upload_id).await.unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::QuerySubmitted);
    assert_eq!(upload.user_query.unwrap().result.len(), 7);
}

#[tokio::test]
async fn drill_down_surfaces_nothing_already_held() {
    let store = Arc::new(InMemoryStore::new());
    let upload_id = store.create_upload(Upload::new("analyst")).await.unwrap();
    let orchestrator = orchestrator(
        store.clone(),
        QueuedEvaluator::new(vec![vec![window_call(30)], vec![], vec![window_call(7)]]),
    );
    let cancel = CancellationToken::new();

    orchestrator
        .submit_query(&upload_id, QueryRequest::new("rates"), &cancel)
        .await
        .unwrap();

    let outcome = orchestrator
        .drill_down(&upload_id, RoundRef::TopLevel, QueryRequest::new("and the minutes?"), &cancel)
        .await
        .unwrap();

    // Retrieval and the tool both only find chunks the top-level round holds
    assert!(outcome.evidence.is_empty());
    assert_eq!(outcome.summary, NO_EVIDENCE_SUMMARY);
    assert!(outcome.tool_calls[0].is_executed());
    assert!(outcome.tool_calls[0].evidence_ids.is_empty());

    let upload = store.get_upload(&upload_id).await.unwrap().unwrap();
    assert_eq!(upload.drill_downs.len(), 1);
    assert_eq!(upload.drill_downs[0].drilldown_id, outcome.round_id);
}

#[tokio::test]
async fn concurrent_drill_downs_both_persist() {
    let store = Arc::new(InMemoryStore::new());
    let upload_id = store.create_upload(Upload::new("analyst")).await.unwrap();
    let orchestrator = orchestrator(store.clone(), QueuedEvaluator::new(vec![]));
    let cancel = CancellationToken::new();
    orchestrator
        .submit_query(&upload_id, QueryRequest::new("rates"), &cancel)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        orchestrator.drill_down(&upload_id, RoundRef::TopLevel, QueryRequest::new("why?"), &cancel),
        orchestrator.drill_down(&upload_id, RoundRef::TopLevel, QueryRequest::new("what next?"), &cancel),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.round_id, b.round_id);

    let upload = store.get_upload(&upload_id).await.unwrap().unwrap();
    let mut stored: Vec<&str> = upload.drill_downs.iter().map(|d| d.drilldown_id.as_str()).collect();
    stored.sort_unstable();
    let mut expected = vec![a.round_id.as_str(), b.round_id.as_str()];
    expected.sort_unstable();
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn rounds_survive_a_file_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("uploads.json");
    let upload_id = {
        let store = Arc::new(FileStore::open(path.clone()).await.unwrap());
        let upload_id = store.create_upload(Upload::new("analyst")).await.unwrap();
        orchestrator(store, QueuedEvaluator::new(vec![vec![window_call(30)]]))
            .submit_query(&upload_id, QueryRequest::new("rates"), &CancellationToken::new())
            .await
            .unwrap();
        upload_id
    };

    let reopened = FileStore::open(path).await.unwrap();
    let upload = reopened.get_upload(&upload_id).await.unwrap().unwrap();
    let round = upload.user_query.unwrap();
    assert_eq!(ids(&round.result), vec!["r1", "r2", "c1", "c2", "c3", "c4", "c5"]);
    assert_eq!(round.tool_calls.len(), 1);
    assert!(round.has_unique_evidence());
}
