//! Tool calls and the traits that decide on and execute them.
//!
//! Tools fill evidence gaps that vector retrieval alone leaves open: fetch
//! the latest release from an external source, scan the corpus for the most
//! recent data points, and so on. The flow per pass is:
//!
//! 1. A [`ToolEvaluator`] proposes new pending [`ToolCall`]s
//! 2. A [`ToolExecutor`] runs them and returns new evidence
//! 3. The calls are kept on the round, marked executed or failed

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::{EvaluationDegraded, ToolError};
use crate::evidence::{ChunkId, EvidenceChunk};
use crate::provider::ToolDefinition;

/// Completion state of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ToolCallState {
    #[default]
    Pending,
    Executed,
    Failed { reason: String },
}

/// A descriptor of one external tool invocation attached to a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID
    pub call_id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Invocation parameters as a JSON value
    #[serde(default)]
    pub parameters: serde_json::Value,

    #[serde(flatten)]
    pub state: ToolCallState,

    /// Chunks this call contributed once executed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_ids: Vec<ChunkId>,
}

impl ToolCall {
    /// Create a new pending call.
    pub fn pending(name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            call_id: Uuid::new_v4().to_string(),
            name: name.into(),
            parameters,
            state: ToolCallState::Pending,
            evidence_ids: Vec::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == ToolCallState::Pending
    }

    pub fn is_executed(&self) -> bool {
        self.state == ToolCallState::Executed
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, ToolCallState::Failed { .. })
    }

    /// Key used for duplicate detection (name + canonical parameters).
    pub fn invocation_key(&self) -> String {
        format!("{}:{}", self.name, self.parameters)
    }
}

/// Drop calls that duplicate one in `existing` or an earlier one in `proposed`.
pub fn without_duplicates(proposed: Vec<ToolCall>, existing: &[ToolCall]) -> Vec<ToolCall> {
    let mut seen: HashSet<String> = existing.iter().map(ToolCall::invocation_key).collect();
    proposed
        .into_iter()
        .filter(|c| seen.insert(c.invocation_key()))
        .collect()
}

/// An external data source the executor can call.
///
/// Each tool (remote_source, corpus_window, ...) implements this trait and is
/// registered in the [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "remote_source").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the evaluator LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Fetch evidence for the given parameters.
    async fn fetch(
        &self,
        parameters: &serde_json::Value,
    ) -> std::result::Result<Vec<EvidenceChunk>, ToolError>;

    /// Convert this tool into a ToolDefinition for the evaluator.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Run a call against the named tool.
    pub async fn fetch(&self, call: &ToolCall) -> std::result::Result<Vec<EvidenceChunk>, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.fetch(&call.parameters).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides which additional tools should run to fill evidence gaps.
#[async_trait]
pub trait ToolEvaluator: Send + Sync {
    fn name(&self) -> &str;

    /// Propose new pending calls.
    ///
    /// Must not return a call that duplicates one in `existing_calls`.
    /// An empty vec means no gap was identified.
    async fn evaluate(
        &self,
        query: &str,
        evidence: &[EvidenceChunk],
        existing_calls: &[ToolCall],
    ) -> std::result::Result<Vec<ToolCall>, EvaluationDegraded>;
}

/// The result of executing a batch of calls.
#[derive(Debug, Clone, Default)]
pub struct ExecutionBatch {
    /// The input calls in input order, with their new state
    pub calls: Vec<ToolCall>,
    /// New chunks in call order, free of excluded and duplicate ids
    pub evidence: Vec<EvidenceChunk>,
}

/// Executes pending tool calls against external data sources.
///
/// Partial-failure semantics: a failing call is marked failed and
/// contributes nothing; the other calls are unaffected. Calls already
/// executed are returned unchanged and contribute nothing.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, calls: Vec<ToolCall>, exclude: &HashSet<ChunkId>) -> ExecutionBatch;
}
