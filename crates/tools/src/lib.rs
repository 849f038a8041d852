//! Evidence-producing tools for deepdive.
//!
//! Tools fetch evidence the corpus retrieval missed: fresh releases from
//! remote publishers and the latest corpus documents in a date window.
//! [`RegistryExecutor`] runs the calls the evaluator proposes.

pub mod corpus_window;
pub mod executor;
pub mod remote_source;

use deepdive_config::ToolsConfig;
use deepdive_core::error::ToolError;
use deepdive_core::retrieval::CorpusIndex;
use deepdive_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

pub use corpus_window::CorpusWindowTool;
pub use executor::RegistryExecutor;
pub use remote_source::RemoteSourceTool;

/// Create the default tool registry.
///
/// `corpus_window` is always present; `remote_source` only when at least
/// one source is configured.
pub fn default_registry(config: &ToolsConfig, corpus: Arc<dyn CorpusIndex>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CorpusWindowTool::new(corpus, config.corpus_window_days)));
    if !config.sources.is_empty() {
        registry.register(Box::new(RemoteSourceTool::new(
            config.sources.clone(),
            Duration::from_secs(config.timeout_secs),
        )?));
    }
    Ok(registry)
}
