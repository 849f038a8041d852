//! `deepdive show`: Print an upload and its rounds.

use deepdive_config::AppConfig;
use deepdive_core::round::{QueryRound, RoundRef};
use deepdive_core::upload::Upload;

use super::evidence_line;
use crate::runtime;

pub async fn run(upload_id: String, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let store = runtime::open_store(&config).await?;
    let upload = store
        .get_upload(&upload_id)
        .await?
        .ok_or_else(|| format!("Not found: upload {upload_id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&upload)?);
    } else {
        print!("{}", render(&upload));
    }
    Ok(())
}

fn render(upload: &Upload) -> String {
    let mut out = String::new();
    out.push_str(&format!("Upload {} ({})\n", upload.upload_id, upload.status));
    out.push_str(&format!(
        "  user: {}  uploaded: {}  images: {}\n",
        upload.user_id,
        upload.uploaded_at.format("%Y-%m-%d %H:%M"),
        upload.image_embeddings().len()
    ));
    if let Some(query) = &upload.initial_query {
        out.push_str(&format!("  initial query: {query}\n"));
    }

    for (index, suggestion) in upload.suggested_queries.iter().enumerate() {
        out.push_str(&format!(
            "  suggestion [{index}] {} ({} chunks)\n",
            suggestion.query,
            suggestion.result.len()
        ));
    }

    match &upload.user_query {
        Some(round) => render_round(&mut out, "top-level", round, 1),
        None => out.push_str("  no top-level query yet\n"),
    }
    for drill in &upload.drill_downs {
        let parent = match &drill.parent {
            RoundRef::TopLevel => "top".to_string(),
            RoundRef::DrillDown(id) => id.clone(),
        };
        let label = format!("drill-down {} <- {parent}", drill.drilldown_id);
        render_round(&mut out, &label, &drill.round, 1);
    }
    out
}

fn render_round(out: &mut String, label: &str, round: &QueryRound, depth: usize) {
    let pad = "  ".repeat(depth);
    out.push_str(&format!("\n{pad}{label}: {}\n", round.query));
    out.push_str(&format!("{pad}  {}\n", round.summary.replace('\n', &format!("\n{pad}  "))));
    for chunk in &round.result {
        out.push_str(&format!("{pad}  - {}\n", evidence_line(chunk)));
    }
    for call in &round.tool_calls {
        out.push_str(&format!("{pad}  tool {} {}\n", call.name, call.parameters));
    }
}
