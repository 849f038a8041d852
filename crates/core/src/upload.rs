//! The upload aggregate: files, suggested queries, and the round tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::evidence::ChunkId;
use crate::round::{DrillDownRound, QueryRound, RoundRef};

/// Lifecycle of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    #[default]
    Uploaded,
    ScreenshotsConfirmed,
    ScreenshotsProcessed,
    ScreenshotsCancelled,
    SuggestedQueriesGenerated,
    QuerySubmitted,
    QueryProcessed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::ScreenshotsConfirmed => "screenshots_confirmed",
            UploadStatus::ScreenshotsProcessed => "screenshots_processed",
            UploadStatus::ScreenshotsCancelled => "screenshots_cancelled",
            UploadStatus::SuggestedQueriesGenerated => "suggested_queries_generated",
            UploadStatus::QuerySubmitted => "query_submitted",
            UploadStatus::QueryProcessed => "query_processed",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadStatus::ScreenshotsCancelled)
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(UploadStatus::Uploaded),
            "screenshots_confirmed" => Ok(UploadStatus::ScreenshotsConfirmed),
            "screenshots_processed" => Ok(UploadStatus::ScreenshotsProcessed),
            "screenshots_cancelled" => Ok(UploadStatus::ScreenshotsCancelled),
            "suggested_queries_generated" => Ok(UploadStatus::SuggestedQueriesGenerated),
            "query_submitted" => Ok(UploadStatus::QuerySubmitted),
            "query_processed" => Ok(UploadStatus::QueryProcessed),
            other => Err(format!("unknown upload status '{other}'")),
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file attached to an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub is_deleted: bool,
    /// Image embedding computed at upload time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, size: u64, content_type: impl Into<String>) -> Self {
        Self {
            file_id: Uuid::new_v4().to_string(),
            name: name.into(),
            size,
            content_type: content_type.into(),
            download_url: String::new(),
            is_deleted: false,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Root aggregate: one user's uploaded material plus every round run on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub upload_id: String,

    pub user_id: String,

    #[serde(default)]
    pub files: Vec<UploadedFile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_query: Option<String>,

    /// Queries suggested from the uploaded material, with cached evidence
    #[serde(default)]
    pub suggested_queries: Vec<QueryRound>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_query: Option<QueryRound>,

    #[serde(default)]
    pub drill_downs: Vec<DrillDownRound>,

    pub uploaded_at: DateTime<Utc>,

    #[serde(default)]
    pub status: UploadStatus,
}

impl Upload {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            upload_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            files: Vec::new(),
            initial_query: None,
            suggested_queries: Vec::new(),
            user_query: None,
            drill_downs: Vec::new(),
            uploaded_at: Utc::now(),
            status: UploadStatus::Uploaded,
        }
    }

    pub fn with_initial_query(mut self, query: impl Into<String>) -> Self {
        self.initial_query = Some(query.into());
        self
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    /// Image embeddings of live files, in file order.
    pub fn image_embeddings(&self) -> Vec<Vec<f32>> {
        self.files
            .iter()
            .filter(|f| !f.is_deleted)
            .filter_map(|f| f.embedding.clone())
            .collect()
    }

    pub fn find_drill_down(&self, drilldown_id: &str) -> Option<&DrillDownRound> {
        self.drill_downs.iter().find(|d| d.drilldown_id == drilldown_id)
    }

    /// Resolve a round reference to the round it names.
    pub fn resolve(&self, target: &RoundRef) -> Option<&QueryRound> {
        match target {
            RoundRef::TopLevel => self.user_query.as_ref(),
            RoundRef::DrillDown(id) => self.find_drill_down(id).map(|d| &d.round),
        }
    }

    /// Every chunk id held by the top-level query or any drill-down.
    pub fn evidence_history(&self) -> HashSet<ChunkId> {
        self.user_query
            .iter()
            .chain(self.drill_downs.iter().map(|d| &d.round))
            .flat_map(|r| r.evidence_ids().cloned())
            .collect()
    }
}
