//! Round state: the stage trace, degraded conditions and the outcome handed
//! back to callers.

use deepdive_core::evidence::EvidenceChunk;
use deepdive_core::round::RoundKind;
use deepdive_core::tool::ToolCall;
use serde::Serialize;
use std::fmt;

/// Stages a round moves through. Passes are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "pass", rename_all = "snake_case")]
pub enum RoundStage {
    Started,
    Retrieved,
    ToolsEvaluated(u8),
    ToolsExecuted(u8),
    Summarized,
    Persisted,
}

impl fmt::Display for RoundStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStage::Started => write!(f, "started"),
            RoundStage::Retrieved => write!(f, "retrieved"),
            RoundStage::ToolsEvaluated(pass) => write!(f, "tools_evaluated({pass})"),
            RoundStage::ToolsExecuted(pass) => write!(f, "tools_executed({pass})"),
            RoundStage::Summarized => write!(f, "summarized"),
            RoundStage::Persisted => write!(f, "persisted"),
        }
    }
}

/// The ordered stages a round went through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundTrace {
    stages: Vec<RoundStage>,
}

impl RoundTrace {
    pub fn record(&mut self, stage: RoundStage) {
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[RoundStage] {
        &self.stages
    }

    pub fn last(&self) -> Option<RoundStage> {
        self.stages.last().copied()
    }

    /// Number of evaluate steps taken.
    pub fn passes(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| matches!(s, RoundStage::ToolsEvaluated(_)))
            .count()
    }
}

impl fmt::Display for RoundTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.stages.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", names.join(" -> "))
    }
}

/// A non-fatal collaborator failure the round absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradedCondition {
    /// The corpus index could not be searched; retrieval contributed nothing
    Retrieval { reason: String },
    /// The evaluator failed; the pass proposed no tools
    Evaluation { pass: u8, reason: String },
    /// One tool call failed; the others were unaffected
    ToolExecution { pass: u8, tool: String, reason: String },
}

impl fmt::Display for DegradedCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedCondition::Retrieval { reason } => write!(f, "retrieval degraded: {reason}"),
            DegradedCondition::Evaluation { pass, reason } => {
                write!(f, "evaluation degraded in pass {pass}: {reason}")
            }
            DegradedCondition::ToolExecution { pass, tool, reason } => {
                write!(f, "tool {tool} failed in pass {pass}: {reason}")
            }
        }
    }
}

/// What a persisted round hands back to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct RoundOutcome {
    /// The top-level round id, or the drill-down id
    pub round_id: String,
    pub kind: RoundKind,
    pub summary: String,
    /// Newest first
    pub evidence: Vec<EvidenceChunk>,
    pub tool_calls: Vec<ToolCall>,
    pub trace: RoundTrace,
    pub degraded: Vec<DegradedCondition>,
    /// Whether evidence was reused from a stored suggestion
    pub cache_hit: bool,
}

impl RoundOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}
