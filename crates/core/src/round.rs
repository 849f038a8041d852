//! Query rounds: one orchestration pass producing evidence and a summary.
//!
//! A [`QueryRound`] is either the upload's single top-level query or the
//! base of a [`DrillDownRound`], which adds a parent reference and its own
//! external identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::{ChunkId, ChunkType, EvidenceChunk};
use crate::tool::ToolCall;

/// Optional filters narrowing what retrieval may return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,

    /// Allowed source tags. Empty = any source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_list: Vec<String>,

    /// Allowed payload kinds. Empty = any kind.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunk_types: Vec<ChunkType>,

    /// Economy / region the query is about (e.g. "US", "Euro Area")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economy: Option<String>,

    /// Keywords that must appear in text evidence. Empty = no constraint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl RoundFilters {
    /// Whether a chunk passes every configured filter.
    ///
    /// Chunks without a publication date pass date filters.
    pub fn accepts(&self, chunk: &EvidenceChunk) -> bool {
        if let (Some(start), Some(published)) = (self.start_date, chunk.published_at) {
            if published < start {
                return false;
            }
        }
        if let (Some(end), Some(published)) = (self.end_date, chunk.published_at) {
            if published > end {
                return false;
            }
        }
        if !self.source_list.is_empty()
            && !self
                .source_list
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&chunk.source))
        {
            return false;
        }
        if !self.chunk_types.is_empty() && !self.chunk_types.contains(&chunk.chunk_type()) {
            return false;
        }
        if let Some(economy) = &self.economy {
            // Untagged chunks cannot be shown to cover the economy
            match &chunk.economy {
                Some(tag) if tag.eq_ignore_ascii_case(economy) => {}
                _ => return false,
            }
        }
        if !self.keywords.is_empty() {
            let text = chunk.payload.render().to_lowercase();
            if !self.keywords.iter().any(|k| text.contains(&k.to_lowercase())) {
                return false;
            }
        }
        true
    }

    /// Whether the date range is well formed.
    pub fn is_valid(&self) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }
}

/// One orchestration pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRound {
    pub round_id: String,

    pub query: String,

    #[serde(default)]
    pub filters: RoundFilters,

    /// Evidence, newest first, no duplicate ids
    #[serde(default)]
    pub result: Vec<EvidenceChunk>,

    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Derived from the current `result`
    #[serde(default)]
    pub summary: String,

    /// Embedding vectors used for retrieval, query embedding first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vectors: Vec<Vec<f32>>,

    /// Suggested by the system rather than typed by the user
    #[serde(default)]
    pub is_suggested_query: bool,

    pub timestamp: DateTime<Utc>,
}

impl QueryRound {
    /// Create an empty round for a user-authored query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            round_id: Uuid::new_v4().to_string(),
            query: query.into(),
            filters: RoundFilters::default(),
            result: Vec::new(),
            tool_calls: Vec::new(),
            summary: String::new(),
            vectors: Vec::new(),
            is_suggested_query: false,
            timestamp: Utc::now(),
        }
    }

    /// Create a system-suggested round with pre-computed evidence and vectors.
    pub fn suggested(
        query: impl Into<String>,
        result: Vec<EvidenceChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Self {
        Self {
            result,
            vectors,
            is_suggested_query: true,
            ..Self::new(query)
        }
    }

    pub fn with_filters(mut self, filters: RoundFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn evidence_ids(&self) -> impl Iterator<Item = &ChunkId> {
        self.result.iter().map(|c| &c.id)
    }

    /// Whether `result` holds no two chunks with the same id.
    pub fn has_unique_evidence(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.result.iter().all(|c| seen.insert(&c.id))
    }
}

/// What a drill-down is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RoundRef {
    /// The upload's top-level `user_query`
    TopLevel,
    /// Another drill-down, by `drilldown_id`
    DrillDown(String),
}

impl std::fmt::Display for RoundRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundRef::TopLevel => write!(f, "top-level query"),
            RoundRef::DrillDown(id) => write!(f, "drill-down {id}"),
        }
    }
}

/// A follow-up round scoped to a prior round. Append-only once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillDownRound {
    pub drilldown_id: String,

    pub parent: RoundRef,

    /// Issuing user; `None` for anonymous users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(flatten)]
    pub round: QueryRound,
}

impl DrillDownRound {
    pub fn new(parent: RoundRef, user_id: Option<String>, round: QueryRound) -> Self {
        Self {
            drilldown_id: round.round_id.clone(),
            parent,
            user_id,
            round,
        }
    }
}

/// Whether a round is the upload's top-level query or a drill-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    TopLevel,
    DrillDown,
}
