pub mod ask;
pub mod doctor;
pub mod drill;
pub mod list;
pub mod onboard;
pub mod show;
pub mod suggest;
pub mod upload;

use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use deepdive_core::error::Error;
use deepdive_core::event::PipelineEvent;
use deepdive_core::evidence::{ChunkType, EvidenceChunk, EvidenceOrigin};
use deepdive_core::round::RoundFilters;
use deepdive_core::tool::ToolCallState;
use deepdive_pipeline::{QueryOrchestrator, RoundOutcome};
use deepdive_providers::prompt::preview;
use tokio_util::sync::CancellationToken;

/// Filters narrowing what a round may retrieve.
#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Earliest publication date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,

    /// Latest publication date (YYYY-MM-DD), inclusive
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,

    /// Restrict to these sources. Repeatable.
    #[arg(long = "source")]
    pub sources: Vec<String>,

    /// Restrict to one economy
    #[arg(long)]
    pub economy: Option<String>,

    /// Require one of these keywords. Repeatable.
    #[arg(long = "keyword")]
    pub keywords: Vec<String>,

    /// Restrict to these chunk types. Repeatable.
    #[arg(long = "type", value_enum)]
    pub chunk_types: Vec<ChunkTypeArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkTypeArg {
    Text,
    Chart,
    Table,
}

impl From<ChunkTypeArg> for ChunkType {
    fn from(arg: ChunkTypeArg) -> Self {
        match arg {
            ChunkTypeArg::Text => ChunkType::Text,
            ChunkTypeArg::Chart => ChunkType::Chart,
            ChunkTypeArg::Table => ChunkType::Table,
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

impl FilterArgs {
    pub fn into_filters(self) -> RoundFilters {
        RoundFilters {
            start_date: self.from.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|d| d.and_utc()),
            end_date: self.to.and_then(|d| d.and_hms_opt(23, 59, 59)).map(|d| d.and_utc()),
            source_list: self.sources,
            chunk_types: self.chunk_types.into_iter().map(ChunkType::from).collect(),
            economy: self.economy,
            keywords: self.keywords,
        }
    }
}

/// A token cancelled by Ctrl-C.
pub fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Cancelling, the round will not be saved...");
            guard.cancel();
        }
    });
    cancel
}

/// Print round progress to stderr until the bus closes or the task is aborted.
pub fn spawn_progress(orchestrator: &QueryOrchestrator) -> tokio::task::JoinHandle<()> {
    let mut rx = orchestrator.event_bus().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event.as_ref() {
                PipelineEvent::RoundStarted { kind, .. } => eprintln!("  ▸ {kind:?} round started"),
                PipelineEvent::StageCompleted {
                    stage, evidence_count, ..
                } => eprintln!("  ▸ {stage} ({evidence_count} chunks)"),
                PipelineEvent::ToolExecuted {
                    tool_name,
                    success,
                    chunk_count,
                    duration_ms,
                    ..
                } => {
                    let mark = if *success { "✅" } else { "❌" };
                    eprintln!("    {mark} {tool_name}: {chunk_count} chunks in {duration_ms}ms");
                }
                PipelineEvent::Degraded { condition, .. } => eprintln!("    ⚠️  {condition}"),
                PipelineEvent::RoundPersisted { .. } | PipelineEvent::RoundAborted { .. } => {}
            }
        }
    })
}

/// Turn a round error into the message shown to the user.
pub fn report(error: Error) -> Box<dyn std::error::Error> {
    tracing::debug!(error = %error, "Round failed");
    error.user_message().into()
}

pub fn print_outcome(outcome: &RoundOutcome, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!();
    println!("Round {}{}", outcome.round_id, if outcome.cache_hit { " (cached)" } else { "" });
    println!("========================================\n");
    println!("{}\n", outcome.summary);

    if !outcome.evidence.is_empty() {
        println!("Evidence (newest first):");
        for chunk in &outcome.evidence {
            println!("  {}", evidence_line(chunk));
        }
        println!();
    }

    if !outcome.tool_calls.is_empty() {
        println!("Tool calls:");
        for call in &outcome.tool_calls {
            let state = match &call.state {
                ToolCallState::Executed => format!("executed, {} chunks", call.evidence_ids.len()),
                ToolCallState::Failed { reason } => format!("failed: {reason}"),
                ToolCallState::Pending => "pending".to_string(),
            };
            println!("  {} {} [{}]", call.name, call.parameters, state);
        }
        println!();
    }

    for condition in &outcome.degraded {
        println!("  ⚠️  {condition}");
    }
    println!("  Stages: {}", outcome.trace);
    Ok(())
}

pub fn evidence_line(chunk: &EvidenceChunk) -> String {
    let date = chunk
        .published_at
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "undated".into());
    let origin = match &chunk.origin {
        EvidenceOrigin::Corpus => "corpus".to_string(),
        EvidenceOrigin::External { tool } => tool.clone(),
    };
    format!(
        "[{}] {} {} {}: {}",
        chunk.id,
        date,
        origin,
        chunk.source,
        preview(&chunk.payload.render(), 100)
    )
}
