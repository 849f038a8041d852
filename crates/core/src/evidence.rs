//! Evidence chunks: the atomic unit of retrieved information.
//!
//! A chunk is either pulled from the internal corpus by similarity search or
//! fetched from an external source by a tool call. Every chunk carries a
//! stable identifier; rounds never hold two chunks with the same id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Stable content identifier of an evidence chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceOrigin {
    /// The internal corpus, via vector similarity search.
    Corpus,
    /// An external data source, via the named tool.
    External { tool: String },
}

impl EvidenceOrigin {
    pub fn is_external(&self) -> bool {
        matches!(self, EvidenceOrigin::External { .. })
    }
}

/// The kind of payload a chunk carries. Used by `chunk_types` filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Text,
    Chart,
    Table,
}

/// The content of a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkPayload {
    Text {
        text: String,
    },
    Chart {
        title: String,
        /// (label, value) points in display order
        #[serde(default)]
        series: Vec<(String, f64)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Table {
        #[serde(default)]
        headers: Vec<String>,
        #[serde(default)]
        rows: Vec<Vec<String>>,
    },
}

impl ChunkPayload {
    pub fn chunk_type(&self) -> ChunkType {
        match self {
            ChunkPayload::Text { .. } => ChunkType::Text,
            ChunkPayload::Chart { .. } => ChunkType::Chart,
            ChunkPayload::Table { .. } => ChunkType::Table,
        }
    }

    /// Flatten the payload into plain text for prompts and digests.
    pub fn render(&self) -> String {
        match self {
            ChunkPayload::Text { text } => text.clone(),
            ChunkPayload::Chart {
                title,
                series,
                caption,
            } => {
                let points: Vec<String> = series
                    .iter()
                    .map(|(label, value)| format!("{label}: {value}"))
                    .collect();
                let mut out = format!("Chart \"{title}\" ({})", points.join(", "));
                if let Some(caption) = caption {
                    out.push_str(" - ");
                    out.push_str(caption);
                }
                out
            }
            ChunkPayload::Table { headers, rows } => {
                let mut lines = vec![headers.join(" | ")];
                lines.extend(rows.iter().map(|r| r.join(" | ")));
                lines.join("\n")
            }
        }
    }
}

/// A single unit of evidence attached to a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub id: ChunkId,

    pub origin: EvidenceOrigin,

    /// Publisher / source tag (matched by `source_list` filters)
    #[serde(default)]
    pub source: String,

    /// Economy / region the chunk covers (matched by `economy` filters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economy: Option<String>,

    /// Similarity score in [0, 1]; tool-sourced chunks default to 1.0
    #[serde(default)]
    pub score: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    pub payload: ChunkPayload,

    /// Whether the user selected this chunk in the round it belongs to
    #[serde(default)]
    pub is_selected: bool,
}

impl EvidenceChunk {
    /// Build a chunk whose id is derived from its origin and payload.
    pub fn derived(origin: EvidenceOrigin, source: impl Into<String>, payload: ChunkPayload) -> Self {
        let id = content_id(&origin, &payload);
        Self {
            id,
            origin,
            source: source.into(),
            economy: None,
            score: 1.0,
            published_at: None,
            payload,
            is_selected: false,
        }
    }

    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: ChunkId::new(id),
            origin: EvidenceOrigin::Corpus,
            source: String::new(),
            economy: None,
            score: 0.0,
            published_at: None,
            payload: ChunkPayload::Text { text: text.into() },
            is_selected: false,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_economy(mut self, economy: impl Into<String>) -> Self {
        self.economy = Some(economy.into());
        self
    }

    pub fn with_origin(mut self, origin: EvidenceOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    pub fn chunk_type(&self) -> ChunkType {
        self.payload.chunk_type()
    }
}

/// Derive a stable content identifier: SHA-256 over the origin tag and the
/// serialized payload, hex encoded.
pub fn content_id(origin: &EvidenceOrigin, payload: &ChunkPayload) -> ChunkId {
    let mut hasher = Sha256::new();
    match origin {
        EvidenceOrigin::Corpus => hasher.update(b"corpus"),
        EvidenceOrigin::External { tool } => {
            hasher.update(b"external:");
            hasher.update(tool.as_bytes());
        }
    }
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(payload).unwrap_or_default());
    ChunkId(hex::encode(&hasher.finalize()[..16]))
}

/// Collect the ids of a chunk list.
pub fn chunk_ids<'a>(chunks: impl IntoIterator<Item = &'a EvidenceChunk>) -> HashSet<ChunkId> {
    chunks.into_iter().map(|c| c.id.clone()).collect()
}

/// Drop chunks whose id is in `exclude` or already seen earlier in the list.
pub fn dedup_against(chunks: Vec<EvidenceChunk>, exclude: &HashSet<ChunkId>) -> Vec<EvidenceChunk> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|c| !exclude.contains(&c.id) && seen.insert(c.id.clone()))
        .collect()
}

/// Place `fresh` chunks before `held` ones (newest first), skipping ids the
/// held list already contains.
pub fn prepend_fresh(held: Vec<EvidenceChunk>, fresh: Vec<EvidenceChunk>) -> Vec<EvidenceChunk> {
    let held_ids = chunk_ids(&held);
    let mut merged = dedup_against(fresh, &held_ids);
    merged.extend(held);
    merged
}
