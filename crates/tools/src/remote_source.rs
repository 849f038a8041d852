//! Remote source tool: pulls the latest records from a configured HTTP
//! endpoint that serves a JSON array of evidence records.
//!
//! Record shape (one array element):
//! ```json
//! { "type": "text", "text": "CPI rose 0.2% m/m", "source": "bls",
//!   "published_at": "2024-07-11T12:30:00Z" }
//! ```
//! `type` may also be `chart` or `table`, with the matching payload fields.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deepdive_config::RemoteSourceConfig;
use deepdive_core::error::ToolError;
use deepdive_core::evidence::{ChunkPayload, EvidenceChunk, EvidenceOrigin};
use deepdive_core::tool::Tool;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const TOOL_NAME: &str = "remote_source";

/// Records kept from a single response.
const MAX_RECORDS: usize = 25;

#[derive(Debug, Deserialize)]
struct RemoteRecord {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    economy: Option<String>,
    #[serde(flatten)]
    payload: ChunkPayload,
}

pub struct RemoteSourceTool {
    client: reqwest::Client,
    sources: Vec<RemoteSourceConfig>,
}

impl RemoteSourceTool {
    pub fn new(sources: Vec<RemoteSourceConfig>, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, sources })
    }

    fn find_source(&self, name: &str) -> Option<&RemoteSourceConfig> {
        self.sources.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

#[async_trait]
impl Tool for RemoteSourceTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Fetch the most recent releases from an external economic data source. \
         Use when the evidence lacks recent figures from that source."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name.as_str()).collect();
        let described: Vec<String> = self
            .sources
            .iter()
            .map(|s| {
                if s.description.is_empty() {
                    s.name.clone()
                } else {
                    format!("{} ({})", s.name, s.description)
                }
            })
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "enum": names,
                    "description": format!("Data source to query: {}", described.join("; "))
                },
                "keyword": {
                    "type": "string",
                    "description": "Optional keyword the records must mention"
                }
            },
            "required": ["source"]
        })
    }

    async fn fetch(&self, parameters: &serde_json::Value) -> Result<Vec<EvidenceChunk>, ToolError> {
        let name = parameters["source"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'source' argument".into()))?;
        let source = self
            .find_source(name)
            .ok_or_else(|| ToolError::InvalidArguments(format!("Unknown source: {name}")))?;
        let keyword = parameters["keyword"].as_str();

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason,
        };

        let response = self
            .client
            .get(&source.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| failed(format!("{}: {e}", source.name)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("{} returned HTTP {}", source.name, status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| failed(format!("{}: {e}", source.name)))?;
        let chunks = parse_records(&body, &source.name, keyword).map_err(failed)?;
        debug!(source = %source.name, count = chunks.len(), "Remote source fetched");
        Ok(chunks)
    }
}

/// Parse a response body into chunks, newest first.
///
/// Records without a `source` inherit the configured source name.
pub fn parse_records(body: &str, source_name: &str, keyword: Option<&str>) -> Result<Vec<EvidenceChunk>, String> {
    let records: Vec<RemoteRecord> =
        serde_json::from_str(body).map_err(|e| format!("{source_name}: invalid response body: {e}"))?;

    let keyword = keyword.map(str::to_lowercase);
    let mut chunks: Vec<EvidenceChunk> = records
        .into_iter()
        .filter(|r| match &keyword {
            Some(k) => r.payload.render().to_lowercase().contains(k),
            None => true,
        })
        .map(|r| {
            let origin = EvidenceOrigin::External {
                tool: TOOL_NAME.into(),
            };
            let mut chunk =
                EvidenceChunk::derived(origin, r.source.unwrap_or_else(|| source_name.to_string()), r.payload);
            chunk.published_at = r.published_at;
            chunk.economy = r.economy;
            chunk
        })
        .collect();

    // Undated records sort last
    chunks.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    chunks.truncate(MAX_RECORDS);
    Ok(chunks)
}
