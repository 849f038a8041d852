//! Registry-backed tool executor.
//!
//! Pending and failed calls run concurrently, each under its own timeout.
//! One call failing never affects the others.

use async_trait::async_trait;
use deepdive_core::error::ToolError;
use deepdive_core::evidence::{ChunkId, EvidenceChunk, EvidenceOrigin};
use deepdive_core::tool::{ExecutionBatch, ToolCall, ToolCallState, ToolExecutor, ToolRegistry};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct RegistryExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl RegistryExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    async fn run(&self, call: &ToolCall) -> Result<Vec<EvidenceChunk>, ToolError> {
        match tokio::time::timeout(self.timeout, self.registry.fetch(call)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl ToolExecutor for RegistryExecutor {
    async fn execute(&self, calls: Vec<ToolCall>, exclude: &HashSet<ChunkId>) -> ExecutionBatch {
        let outcomes = join_all(calls.iter().map(|call| async move {
            if call.is_executed() {
                return None;
            }
            let started = Instant::now();
            let result = self.run(call).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            Some((result, duration_ms))
        }))
        .await;

        let mut seen: HashSet<ChunkId> = exclude.clone();
        let mut evidence = Vec::new();
        let mut executed = Vec::with_capacity(calls.len());

        for (mut call, outcome) in calls.into_iter().zip(outcomes) {
            let Some((result, duration_ms)) = outcome else {
                executed.push(call);
                continue;
            };

            match result {
                Ok(chunks) => {
                    let fresh: Vec<EvidenceChunk> = chunks
                        .into_iter()
                        .map(|c| {
                            c.with_origin(EvidenceOrigin::External {
                                tool: call.name.clone(),
                            })
                        })
                        .filter(|c| seen.insert(c.id.clone()))
                        .collect();
                    info!(
                        tool = %call.name,
                        chunks = fresh.len(),
                        duration_ms,
                        "Tool executed"
                    );
                    call.evidence_ids = fresh.iter().map(|c| c.id.clone()).collect();
                    call.state = ToolCallState::Executed;
                    evidence.extend(fresh);
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, duration_ms, "Tool call failed");
                    call.evidence_ids.clear();
                    call.state = ToolCallState::Failed { reason: e.to_string() };
                }
            }
            executed.push(call);
        }

        ExecutionBatch {
            calls: executed,
            evidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepdive_core::tool::Tool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns one chunk per comma-separated id in the `ids` parameter.
    struct StaticTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &str {
            "static"
        }
        fn description(&self) -> &str {
            "Returns fixed chunks"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn fetch(&self, parameters: &serde_json::Value) -> Result<Vec<EvidenceChunk>, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if parameters["fail"].as_bool().unwrap_or(false) {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "static".into(),
                    reason: "upstream returned 503".into(),
                });
            }
            let ids = parameters["ids"].as_str().unwrap_or_default();
            Ok(ids
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|id| EvidenceChunk::text(id, format!("chunk {id}")))
                .collect())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Never answers in time"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn fetch(&self, _parameters: &serde_json::Value) -> Result<Vec<EvidenceChunk>, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn executor() -> (RegistryExecutor, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StaticTool {
            calls: counter.clone(),
        }));
        registry.register(Box::new(SlowTool));
        (
            RegistryExecutor::new(Arc::new(registry), Duration::from_secs(5)),
            counter,
        )
    }

    fn call(params: serde_json::Value) -> ToolCall {
        ToolCall::pending("static", params)
    }

    #[tokio::test]
    async fn one_failure_leaves_others_intact() {
        let (executor, _) = executor();
        let calls = vec![
            call(serde_json::json!({"ids": "a,b"})),
            call(serde_json::json!({"fail": true})),
            call(serde_json::json!({"ids": "c"})),
        ];
        let batch = executor.execute(calls, &HashSet::new()).await;

        assert_eq!(batch.calls.len(), 3);
        assert!(batch.calls[0].is_executed());
        assert!(batch.calls[1].is_failed());
        assert!(batch.calls[2].is_executed());
        assert!(batch.calls[1].evidence_ids.is_empty());

        let ids: Vec<&str> = batch.evidence.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(batch
            .evidence
            .iter()
            .all(|c| c.origin == EvidenceOrigin::External { tool: "static".into() }));
    }

    #[tokio::test]
    async fn excluded_and_repeated_ids_are_dropped() {
        let (executor, _) = executor();
        let exclude: HashSet<ChunkId> = [ChunkId::new("a")].into_iter().collect();
        let calls = vec![
            call(serde_json::json!({"ids": "a,b"})),
            call(serde_json::json!({"ids": "b,c"})),
        ];
        let batch = executor.execute(calls, &exclude).await;

        let ids: Vec<&str> = batch.evidence.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(batch.calls[0].evidence_ids, vec![ChunkId::new("b")]);
        assert_eq!(batch.calls[1].evidence_ids, vec![ChunkId::new("c")]);
    }

    #[tokio::test]
    async fn executed_calls_are_not_rerun() {
        let (executor, counter) = executor();
        let first = executor
            .execute(vec![call(serde_json::json!({"ids": "a"}))], &HashSet::new())
            .await;
        let again = executor.execute(first.calls.clone(), &HashSet::new()).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(again.evidence.is_empty());
        assert_eq!(again.calls, first.calls);
    }

    #[tokio::test]
    async fn failed_calls_can_be_retried() {
        let (executor, counter) = executor();
        let mut failed = call(serde_json::json!({"ids": "a"}));
        failed.state = ToolCallState::Failed {
            reason: "earlier timeout".into(),
        };
        let batch = executor.execute(vec![failed], &HashSet::new()).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(batch.calls[0].is_executed());
        assert_eq!(batch.evidence.len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_fails_the_call() {
        let (executor, _) = executor();
        let batch = executor
            .execute(vec![ToolCall::pending("missing", serde_json::json!({}))], &HashSet::new())
            .await;
        match &batch.calls[0].state {
            ToolCallState::Failed { reason } => assert!(reason.contains("missing")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let (executor, _) = executor();
        let batch = executor
            .execute(
                vec![
                    ToolCall::pending("slow", serde_json::json!({})),
                    call(serde_json::json!({"ids": "a"})),
                ],
                &HashSet::new(),
            )
            .await;
        assert!(batch.calls[0].is_failed());
        assert!(batch.calls[1].is_executed());
    }
}
