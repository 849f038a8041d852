//! Pipeline events: decoupled observation of round progress.
//!
//! The orchestrator publishes an event at every stage boundary. The CLI
//! subscribes to print progress; tests subscribe to assert ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::round::RoundKind;

/// All events emitted while running rounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// A round began executing
    RoundStarted {
        upload_id: String,
        round_id: String,
        kind: RoundKind,
        timestamp: DateTime<Utc>,
    },

    /// A stage of the round finished (e.g. "retrieved", "tools_executed(1)")
    StageCompleted {
        round_id: String,
        stage: String,
        evidence_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool call finished
    ToolExecuted {
        round_id: String,
        tool_name: String,
        success: bool,
        chunk_count: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A collaborator failed in a non-fatal way
    Degraded {
        round_id: String,
        condition: String,
        timestamp: DateTime<Utc>,
    },

    /// The round was stored; its id is now visible to callers
    RoundPersisted {
        upload_id: String,
        round_id: String,
        kind: RoundKind,
        timestamp: DateTime<Utc>,
    },

    /// The round ended without being stored
    RoundAborted {
        upload_id: String,
        round_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for pipeline events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<PipelineEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PipelineEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
