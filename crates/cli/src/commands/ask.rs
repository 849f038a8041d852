//! `deepdive ask`: Run the upload's top-level query.

use deepdive_config::AppConfig;
use deepdive_pipeline::QueryRequest;

use super::{FilterArgs, ctrl_c_token, print_outcome, report, spawn_progress};
use crate::runtime;

pub async fn run(
    upload_id: String,
    query: Option<String>,
    suggested: Option<usize>,
    filters: FilterArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = match (query, suggested) {
        (_, Some(index)) => QueryRequest::suggested(index),
        (Some(query), None) => QueryRequest::new(query),
        (None, None) => return Err("provide a query or --suggested <n>".into()),
    }
    .with_filters(filters.into_filters());

    let config = AppConfig::load()?;
    let orchestrator = runtime::orchestrator(&config).await?;
    let progress = (!json).then(|| spawn_progress(&orchestrator));

    let result = orchestrator.submit_query(&upload_id, request, &ctrl_c_token()).await;
    if let Some(progress) = progress {
        progress.abort();
    }

    print_outcome(&result.map_err(report)?, json)
}
