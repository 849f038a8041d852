//! `deepdive suggest`: Precompute evidence for suggested queries.

use deepdive_config::AppConfig;

use super::report;
use crate::runtime;

pub async fn run(upload_id: String, queries: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let orchestrator = runtime::orchestrator(&config).await?;

    let suggestions = orchestrator
        .prepare_suggestions(&upload_id, queries)
        .await
        .map_err(report)?;

    for (index, suggestion) in suggestions.iter().enumerate() {
        let note = if suggestion.vectors.is_empty() {
            " (retrieval degraded, will run live)"
        } else {
            ""
        };
        println!("  [{index}] {} ({} chunks){note}", suggestion.query, suggestion.result.len());
    }
    println!("\nForward one with `deepdive ask {upload_id} --suggested <n>`");
    Ok(())
}
