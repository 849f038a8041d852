//! The query orchestrator: runs one round end to end.
//!
//! ```text
//! embed -> retrieve (or reuse a suggestion) -> (evaluate -> execute) x PASS_COUNT
//!       -> summarize -> persist
//! ```
//!
//! Evidence is kept newest first: each pass places tool-sourced chunks before
//! the chunks already held. Drill-downs never surface a chunk the upload
//! already holds in any earlier round. Degraded collaborators are recorded
//! and the round carries on; everything else aborts it before anything is
//! written.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use deepdive_core::embedding::Embedder;
use deepdive_core::error::{Error, Result};
use deepdive_core::event::{EventBus, PipelineEvent};
use deepdive_core::evidence::{chunk_ids, dedup_against, prepend_fresh};
use deepdive_core::retrieval::{RetrievalRequest, VectorRetriever};
use deepdive_core::round::{DrillDownRound, QueryRound, RoundFilters, RoundKind, RoundRef};
use deepdive_core::store::{EvidenceStore, SaveRound};
use deepdive_core::summary::Summarizer;
use deepdive_core::tool::{ToolCall, ToolCallState, ToolEvaluator, ToolExecutor, without_duplicates};
use deepdive_core::upload::Upload;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::{DegradedCondition, RoundOutcome, RoundStage, RoundTrace};

/// Evaluate -> execute cycles per round.
pub const PASS_COUNT: u8 = 2;

const DEFAULT_MAX_RESULTS: usize = 20;

/// A query as submitted by a caller.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub query: String,
    pub filters: RoundFilters,
    /// Index into the upload's suggested queries, when forwarding one
    pub suggested: Option<usize>,
    /// Issuing user for drill-downs; `None` for anonymous users
    pub user_id: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Forward the upload's suggested query at `index`.
    pub fn suggested(index: usize) -> Self {
        Self {
            suggested: Some(index),
            ..Default::default()
        }
    }

    pub fn with_filters(mut self, filters: RoundFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Where a finished round is stored.
enum Target {
    TopLevel,
    DrillDown(RoundRef),
}

impl Target {
    fn kind(&self) -> RoundKind {
        match self {
            Target::TopLevel => RoundKind::TopLevel,
            Target::DrillDown(_) => RoundKind::DrillDown,
        }
    }
}

/// Runs query rounds over injected collaborators.
pub struct QueryOrchestrator {
    embedder: Arc<dyn Embedder>,
    retriever: Arc<dyn VectorRetriever>,
    evaluator: Arc<dyn ToolEvaluator>,
    executor: Arc<dyn ToolExecutor>,
    summarizer: Arc<dyn Summarizer>,
    store: Arc<dyn EvidenceStore>,
    event_bus: Arc<EventBus>,
    max_results: usize,
}

impl QueryOrchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Arc<dyn VectorRetriever>,
        evaluator: Arc<dyn ToolEvaluator>,
        executor: Arc<dyn ToolExecutor>,
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn EvidenceStore>,
    ) -> Self {
        Self {
            embedder,
            retriever,
            evaluator,
            executor,
            summarizer,
            store,
            event_bus: Arc::new(EventBus::default()),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Cap on chunks taken from retrieval per round.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn store(&self) -> Arc<dyn EvidenceStore> {
        self.store.clone()
    }

    /// Run the upload's top-level query. Replaces any earlier top-level
    /// round.
    pub async fn submit_query(
        &self,
        upload_id: &str,
        request: QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<RoundOutcome> {
        self.run(upload_id, Target::TopLevel, request, cancel).await
    }

    /// Run a follow-up round scoped to `parent`. Returns the new drill-down id.
    pub async fn drill_down(
        &self,
        upload_id: &str,
        parent: RoundRef,
        request: QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<RoundOutcome> {
        self.run(upload_id, Target::DrillDown(parent), request, cancel).await
    }

    /// Retrieve evidence for each suggested query and store the results so a
    /// later forwarded suggestion can skip retrieval.
    ///
    /// Suggestions whose retrieval degraded are stored without vectors and
    /// never produce a cache hit.
    pub async fn prepare_suggestions(&self, upload_id: &str, queries: Vec<String>) -> Result<Vec<QueryRound>> {
        let upload = self.load_upload(upload_id).await?;
        if upload.status.is_cancelled() {
            return Err(Error::InvalidRequest(format!("upload {upload_id} was cancelled")));
        }

        let images = upload.image_embeddings();
        let mut suggestions = Vec::with_capacity(queries.len());
        for query in queries {
            let query = query.trim();
            if query.is_empty() {
                continue;
            }
            let vectors = self.embed(query, &images).await?;
            let request = RetrievalRequest::new(vectors.clone()).with_max_results(self.max_results);
            let retrieved = self.retriever.retrieve(&request).await?;
            let suggestion = match retrieved.degraded {
                Some(reason) => {
                    warn!(upload_id, query, reason = %reason, "Suggested query retrieval degraded");
                    QueryRound::suggested(query, Vec::new(), Vec::new())
                }
                None => QueryRound::suggested(query, dedup_against(retrieved.chunks, &HashSet::new()), vectors),
            };
            suggestions.push(suggestion);
        }

        self.store.set_suggested_queries(upload_id, suggestions.clone()).await?;
        info!(upload_id, count = suggestions.len(), "Suggested queries prepared");
        Ok(suggestions)
    }

    async fn load_upload(&self, upload_id: &str) -> Result<Upload> {
        self.store
            .get_upload(upload_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("upload {upload_id}")))
    }

    async fn run(
        &self,
        upload_id: &str,
        target: Target,
        request: QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<RoundOutcome> {
        let upload = self.load_upload(upload_id).await?;
        validate(&upload, &target, &request)?;

        let suggestion = match request.suggested {
            Some(index) => Some(upload.suggested_queries.get(index).ok_or_else(|| {
                Error::NotFound(format!("suggested query {index} on upload {upload_id}"))
            })?),
            None => None,
        };
        let query = match suggestion {
            Some(s) => s.query.clone(),
            None => request.query.trim().to_string(),
        };

        let mut round = QueryRound::new(query).with_filters(request.filters);
        round.is_suggested_query = suggestion.is_some();
        let round_id = round.round_id.clone();
        let kind = target.kind();

        info!(upload_id, round_id = %round_id, ?kind, query = %round.query, "Round started");
        self.event_bus.publish(PipelineEvent::RoundStarted {
            upload_id: upload_id.to_string(),
            round_id: round_id.clone(),
            kind,
            timestamp: Utc::now(),
        });

        match self
            .execute_round(&upload, target, round, request.user_id, suggestion, cancel)
            .await
        {
            Ok(outcome) => {
                info!(
                    upload_id,
                    round_id = %round_id,
                    count = outcome.evidence.len(),
                    degraded = outcome.degraded.len(),
                    "Round persisted"
                );
                self.event_bus.publish(PipelineEvent::RoundPersisted {
                    upload_id: upload_id.to_string(),
                    round_id,
                    kind,
                    timestamp: Utc::now(),
                });
                Ok(outcome)
            }
            Err(e) => {
                warn!(upload_id, round_id = %round_id, error = %e, "Round aborted");
                self.event_bus.publish(PipelineEvent::RoundAborted {
                    upload_id: upload_id.to_string(),
                    round_id,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn execute_round(
        &self,
        upload: &Upload,
        target: Target,
        mut round: QueryRound,
        user_id: Option<String>,
        suggestion: Option<&QueryRound>,
        cancel: &CancellationToken,
    ) -> Result<RoundOutcome> {
        let round_id = round.round_id.clone();
        let mut trace = RoundTrace::default();
        let mut degraded = Vec::new();
        trace.record(RoundStage::Started);
        checkpoint(cancel)?;

        let history = match &target {
            Target::TopLevel => HashSet::new(),
            Target::DrillDown(_) => upload.evidence_history(),
        };

        let images = upload.image_embeddings();
        let cached = suggestion.filter(|s| is_current(s, &images, &round.filters));
        if suggestion.is_some() && cached.is_none() {
            debug!(round_id = %round_id, "Suggested query is stale, retrieving again");
        }

        let (vectors, mut evidence) = match cached {
            Some(s) => {
                debug!(round_id = %round_id, count = s.result.len(), "Reusing suggested query evidence");
                (s.vectors.clone(), dedup_against(s.result.clone(), &history))
            }
            None => {
                let vectors = self.embed(&round.query, &images).await?;
                checkpoint(cancel)?;
                let request = RetrievalRequest::new(vectors.clone())
                    .excluding(history.clone())
                    .with_filters(round.filters.clone())
                    .with_max_results(self.max_results);
                let retrieved = self.retriever.retrieve(&request).await?;
                if let Some(reason) = retrieved.degraded {
                    self.degrade(&round_id, &mut degraded, DegradedCondition::Retrieval { reason });
                }
                (vectors, dedup_against(retrieved.chunks, &history))
            }
        };
        self.advance(&round_id, &mut trace, RoundStage::Retrieved, evidence.len());

        let mut tool_calls: Vec<ToolCall> = Vec::new();
        for pass in 1..=PASS_COUNT {
            checkpoint(cancel)?;

            let proposed = match self.evaluator.evaluate(&round.query, &evidence, &tool_calls).await {
                Ok(calls) => without_duplicates(calls, &tool_calls),
                Err(e) => {
                    self.degrade(
                        &round_id,
                        &mut degraded,
                        DegradedCondition::Evaluation { pass, reason: e.reason },
                    );
                    Vec::new()
                }
            };
            debug!(round_id = %round_id, pass, count = proposed.len(), "Tool calls proposed");
            self.advance(&round_id, &mut trace, RoundStage::ToolsEvaluated(pass), evidence.len());

            if !proposed.is_empty() {
                let mut exclude = history.clone();
                exclude.extend(chunk_ids(&evidence));

                // In-flight calls always run to completion; a cancellation is
                // honoured at the next checkpoint.
                let started = Instant::now();
                let batch = self.executor.execute(proposed, &exclude).await;
                let duration_ms = started.elapsed().as_millis() as u64;

                for call in &batch.calls {
                    self.event_bus.publish(PipelineEvent::ToolExecuted {
                        round_id: round_id.clone(),
                        tool_name: call.name.clone(),
                        success: call.is_executed(),
                        chunk_count: call.evidence_ids.len(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    if let ToolCallState::Failed { reason } = &call.state {
                        self.degrade(
                            &round_id,
                            &mut degraded,
                            DegradedCondition::ToolExecution {
                                pass,
                                tool: call.name.clone(),
                                reason: reason.clone(),
                            },
                        );
                    }
                }

                let fresh = dedup_against(batch.evidence, &exclude);
                evidence = prepend_fresh(evidence, fresh);
                tool_calls.extend(batch.calls);
            }
            self.advance(&round_id, &mut trace, RoundStage::ToolsExecuted(pass), evidence.len());
        }

        checkpoint(cancel)?;
        let summary = self.summarizer.summarize(&round.query, &evidence).await?;
        self.advance(&round_id, &mut trace, RoundStage::Summarized, evidence.len());

        round.result = evidence;
        round.tool_calls = tool_calls;
        round.summary = summary;
        round.vectors = vectors;

        let save = match target {
            Target::TopLevel => SaveRound::TopLevel(round),
            Target::DrillDown(parent) => SaveRound::DrillDown(DrillDownRound::new(parent, user_id, round)),
        };
        let kind = save.kind();
        let saved = save.round().clone();

        // Nothing has been written yet
        checkpoint(cancel)?;
        self.store.save_round(&upload.upload_id, save).await?;
        self.advance(&round_id, &mut trace, RoundStage::Persisted, saved.result.len());

        Ok(RoundOutcome {
            round_id,
            kind,
            summary: saved.summary,
            evidence: saved.result,
            tool_calls: saved.tool_calls,
            trace,
            degraded,
            cache_hit: cached.is_some(),
        })
    }

    /// Query embedding first, then the upload's image embeddings in file order.
    async fn embed(&self, query: &str, images: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(images.len() + 1);
        vectors.push(self.embedder.embed(query).await?);
        vectors.extend(images.iter().cloned());
        Ok(vectors)
    }

    fn advance(&self, round_id: &str, trace: &mut RoundTrace, stage: RoundStage, evidence_count: usize) {
        trace.record(stage);
        debug!(round_id, stage = %stage, count = evidence_count, "Round advanced");
        self.event_bus.publish(PipelineEvent::StageCompleted {
            round_id: round_id.to_string(),
            stage: stage.to_string(),
            evidence_count,
            timestamp: Utc::now(),
        });
    }

    fn degrade(&self, round_id: &str, degraded: &mut Vec<DegradedCondition>, condition: DegradedCondition) {
        warn!(round_id, condition = %condition, "Degraded");
        self.event_bus.publish(PipelineEvent::Degraded {
            round_id: round_id.to_string(),
            condition: condition.to_string(),
            timestamp: Utc::now(),
        });
        degraded.push(condition);
    }
}

fn validate(upload: &Upload, target: &Target, request: &QueryRequest) -> Result<()> {
    if upload.status.is_cancelled() {
        return Err(Error::InvalidRequest(format!("upload {} was cancelled", upload.upload_id)));
    }
    if request.suggested.is_none() && request.query.trim().is_empty() {
        return Err(Error::InvalidRequest("query is empty".into()));
    }
    if !request.filters.is_valid() {
        return Err(Error::InvalidRequest("start_date is after end_date".into()));
    }
    if let Target::DrillDown(parent) = target {
        if upload.user_query.is_none() {
            return Err(Error::NotFound(format!("top-level query on upload {}", upload.upload_id)));
        }
        if upload.resolve(parent).is_none() {
            return Err(Error::NotFound(format!("{parent} on upload {}", upload.upload_id)));
        }
    }
    Ok(())
}

/// A stored suggestion stands in for retrieval only while it was retrieved
/// with the same images and the same filters the round asks for.
fn is_current(suggestion: &QueryRound, images: &[Vec<f32>], filters: &RoundFilters) -> bool {
    if suggestion.filters != *filters {
        return false;
    }
    match suggestion.vectors.split_first() {
        Some((_, stored_images)) => stored_images == images,
        None => false,
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}
