//! Corpus window tool: the most recent corpus chunks inside a look-back
//! window, regardless of similarity to the query.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use deepdive_core::error::ToolError;
use deepdive_core::evidence::{ChunkType, EvidenceChunk};
use deepdive_core::retrieval::CorpusIndex;
use deepdive_core::round::RoundFilters;
use deepdive_core::tool::Tool;
use std::sync::Arc;

pub const TOOL_NAME: &str = "corpus_window";

const DEFAULT_LIMIT: u64 = 10;
const MAX_LIMIT: u64 = 50;

pub struct CorpusWindowTool {
    index: Arc<dyn CorpusIndex>,
    window_days: u32,
}

impl CorpusWindowTool {
    pub fn new(index: Arc<dyn CorpusIndex>, window_days: u32) -> Self {
        Self { index, window_days }
    }

    fn filters(&self, parameters: &serde_json::Value) -> Result<RoundFilters, ToolError> {
        let days = match parameters.get("days") {
            None | Some(serde_json::Value::Null) => self.window_days as i64,
            Some(v) => v
                .as_u64()
                .filter(|d| *d > 0 && *d <= self.window_days as u64)
                .ok_or_else(|| {
                    ToolError::InvalidArguments(format!("'days' must be between 1 and {}", self.window_days))
                })? as i64,
        };

        let strings = |key: &str| -> Vec<String> {
            parameters[key]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default()
        };

        let chunk_types = match parameters["chunk_type"].as_str() {
            None => Vec::new(),
            Some("text") => vec![ChunkType::Text],
            Some("chart") => vec![ChunkType::Chart],
            Some("table") => vec![ChunkType::Table],
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!("Unknown chunk_type: {other}")));
            }
        };

        Ok(RoundFilters {
            start_date: Some(Utc::now() - Duration::days(days)),
            source_list: strings("sources"),
            keywords: strings("keywords"),
            chunk_types,
            economy: parameters["economy"].as_str().map(String::from),
            ..RoundFilters::default()
        })
    }
}

#[async_trait]
impl Tool for CorpusWindowTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "List the most recently published corpus documents, newest first. \
         Use when the evidence is stale or the question asks about the latest data."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "days": {
                    "type": "integer",
                    "description": format!("Look-back window in days (default and max {})", self.window_days)
                },
                "sources": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Only documents from these sources"
                },
                "keywords": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Only documents mentioning one of these keywords"
                },
                "chunk_type": {
                    "type": "string",
                    "enum": ["text", "chart", "table"]
                },
                "economy": {
                    "type": "string",
                    "description": "Only documents about this economy (e.g. \"US\", \"Euro Area\")"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum documents to return (default 10)",
                    "default": DEFAULT_LIMIT
                }
            }
        })
    }

    async fn fetch(&self, parameters: &serde_json::Value) -> Result<Vec<EvidenceChunk>, ToolError> {
        let filters = self.filters(parameters)?;
        let limit = parameters["limit"].as_u64().unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize;

        self.index
            .latest(&filters, limit)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: e.to_string(),
            })
    }
}
