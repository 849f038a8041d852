//! `deepdive drill`: Run a drill-down scoped to an earlier round.

use deepdive_config::AppConfig;
use deepdive_core::round::RoundRef;
use deepdive_pipeline::QueryRequest;

use super::{FilterArgs, ctrl_c_token, print_outcome, report, spawn_progress};
use crate::runtime;

pub async fn run(
    upload_id: String,
    parent: String,
    query: String,
    user: Option<String>,
    filters: FilterArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = QueryRequest::new(query).with_filters(filters.into_filters());
    if let Some(user) = user {
        request = request.with_user(user);
    }

    let config = AppConfig::load()?;
    let orchestrator = runtime::orchestrator(&config).await?;
    let progress = (!json).then(|| spawn_progress(&orchestrator));

    let result = orchestrator
        .drill_down(&upload_id, parent_ref(&parent), request, &ctrl_c_token())
        .await;
    if let Some(progress) = progress {
        progress.abort();
    }

    print_outcome(&result.map_err(report)?, json)
}

fn parent_ref(parent: &str) -> RoundRef {
    match parent {
        "top" | "top-level" => RoundRef::TopLevel,
        id => RoundRef::DrillDown(id.to_string()),
    }
}
