//! Prompt assembly shared by the evaluator and summarizer.

use deepdive_core::evidence::{EvidenceChunk, EvidenceOrigin};
use deepdive_core::tool::ToolCall;

/// Characters of rendered evidence sent per chunk.
const CHUNK_PREVIEW_CHARS: usize = 600;

/// Render evidence as a numbered list for a prompt.
pub fn render_evidence(evidence: &[EvidenceChunk]) -> String {
    if evidence.is_empty() {
        return "(no evidence)".into();
    }
    evidence
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let origin = match &chunk.origin {
                EvidenceOrigin::Corpus => "corpus".to_string(),
                EvidenceOrigin::External { tool } => format!("tool:{tool}"),
            };
            let date = chunk
                .published_at
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "undated".into());
            format!(
                "[{}] ({origin}, {}, {date}) {}",
                i + 1,
                if chunk.source.is_empty() { "unknown source" } else { &chunk.source },
                preview(&chunk.payload.render(), CHUNK_PREVIEW_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render existing tool calls so the model avoids repeating them.
pub fn render_calls(calls: &[ToolCall]) -> String {
    if calls.is_empty() {
        return "(none)".into();
    }
    calls
        .iter()
        .map(|c| format!("- {}({})", c.name, c.parameters))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate on a char boundary, appending an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
