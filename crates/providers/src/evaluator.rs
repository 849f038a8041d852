//! Tool evaluators: decide which tool calls would fill evidence gaps.

use async_trait::async_trait;
use deepdive_core::error::EvaluationDegraded;
use deepdive_core::evidence::EvidenceChunk;
use deepdive_core::message::Message;
use deepdive_core::provider::{Provider, ProviderRequest, ToolDefinition};
use deepdive_core::tool::{ToolCall, ToolEvaluator, without_duplicates};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::prompt;

const EVALUATOR_SYSTEM_PROMPT: &str = "You are a research assistant reviewing the evidence gathered for \
an economics question. If the evidence is missing recent data points or a source the question \
depends on, call the tools that would fill that gap. Call no tool when the evidence already \
answers the question. Never repeat a call listed under 'Calls already made'.";

/// Asks an LLM, via function calling, which registered tools to run.
pub struct LlmToolEvaluator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    tools: Vec<ToolDefinition>,
}

impl LlmToolEvaluator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            tools,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_messages(query: &str, evidence: &[EvidenceChunk], existing: &[ToolCall]) -> Vec<Message> {
        vec![
            Message::system(EVALUATOR_SYSTEM_PROMPT),
            Message::user(format!(
                "Question: {query}\n\nEvidence so far:\n{}\n\nCalls already made:\n{}",
                prompt::render_evidence(evidence),
                prompt::render_calls(existing)
            )),
        ]
    }
}

#[async_trait]
impl ToolEvaluator for LlmToolEvaluator {
    fn name(&self) -> &str {
        "llm"
    }

    async fn evaluate(
        &self,
        query: &str,
        evidence: &[EvidenceChunk],
        existing_calls: &[ToolCall],
    ) -> Result<Vec<ToolCall>, EvaluationDegraded> {
        if self.tools.is_empty() {
            return Ok(Vec::new());
        }

        let request = ProviderRequest::new(&self.model, Self::build_messages(query, evidence, existing_calls))
            .with_temperature(self.temperature)
            .with_tools(self.tools.clone());

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| EvaluationDegraded::new(e.to_string()))?;

        let proposed: Vec<ToolCall> = response
            .message
            .tool_calls
            .into_iter()
            .filter_map(|tc| {
                if !self.tools.iter().any(|t| t.name == tc.name) {
                    warn!(tool = %tc.name, "Evaluator proposed an unknown tool, ignoring");
                    return None;
                }
                let parameters = if tc.arguments.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    match serde_json::from_str(&tc.arguments) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(tool = %tc.name, error = %e, "Evaluator sent unparseable arguments, ignoring");
                            return None;
                        }
                    }
                };
                Some(ToolCall::pending(tc.name, parameters))
            })
            .collect();

        let calls = without_duplicates(proposed, existing_calls);
        debug!(count = calls.len(), "Evaluator proposed tool calls");
        Ok(calls)
    }
}

/// Never proposes a call. Used when no evaluator model is configured.
pub struct NoopEvaluator;

#[async_trait]
impl ToolEvaluator for NoopEvaluator {
    fn name(&self) -> &str {
        "noop"
    }

    async fn evaluate(
        &self,
        _query: &str,
        _evidence: &[EvidenceChunk],
        _existing_calls: &[ToolCall],
    ) -> Result<Vec<ToolCall>, EvaluationDegraded> {
        Ok(Vec::new())
    }
}
