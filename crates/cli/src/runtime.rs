//! Builds the collaborators from configuration.
//!
//! With an API key the evaluator and summarizer are model-backed. Without
//! one, embeddings still go to `api_url` (e.g. a local OpenAI-compatible
//! server) while tool evaluation is disabled and summaries are offline
//! digests.

use std::sync::Arc;
use std::time::Duration;

use deepdive_config::{AppConfig, StoreBackend};
use deepdive_core::embedding::Embedder;
use deepdive_core::retrieval::CorpusIndex;
use deepdive_core::store::EvidenceStore;
use deepdive_core::summary::Summarizer;
use deepdive_core::tool::ToolEvaluator;
use deepdive_pipeline::QueryOrchestrator;
use deepdive_providers::{
    DigestSummarizer, LlmSummarizer, LlmToolEvaluator, NoopEvaluator, OpenAiCompatProvider, ProviderEmbedder,
};
use deepdive_store::{FileStore, InMemoryCorpus, InMemoryStore, IndexRetriever, SqliteStore};
use deepdive_tools::{RegistryExecutor, default_registry};
use tracing::{debug, warn};

pub type BoxError = Box<dyn std::error::Error>;

/// Open the configured evidence store.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn EvidenceStore>, BoxError> {
    let path = config.store.resolved_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store: Arc<dyn EvidenceStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(SqliteStore::new(&path.to_string_lossy()).await?),
        StoreBackend::File => Arc::new(FileStore::open(path).await?),
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
    };
    debug!(backend = store.name(), "Evidence store opened");
    Ok(store)
}

/// Load the corpus, falling back to an empty one.
pub async fn load_corpus(config: &AppConfig) -> Arc<InMemoryCorpus> {
    match InMemoryCorpus::load(&config.corpus_path()).await {
        Ok(corpus) => Arc::new(corpus),
        Err(e) => {
            warn!(error = %e, "Corpus unavailable, retrieval will find nothing");
            Arc::new(InMemoryCorpus::default())
        }
    }
}

/// Wire an orchestrator from configuration.
pub async fn orchestrator(config: &AppConfig) -> Result<QueryOrchestrator, BoxError> {
    let store = open_store(config).await?;
    let index: Arc<dyn CorpusIndex> = load_corpus(config).await;

    let registry = default_registry(&config.tools, index.clone())?;
    let definitions = registry.definitions();
    let executor = RegistryExecutor::new(Arc::new(registry), Duration::from_secs(config.tools.timeout_secs));

    let provider = Arc::new(OpenAiCompatProvider::new(
        "openai",
        config.api_url.clone(),
        config.api_key.clone().unwrap_or_default(),
    )?);
    let embedder: Arc<dyn Embedder> = Arc::new(ProviderEmbedder::new(provider.clone(), &config.models.embedding));

    let (evaluator, summarizer): (Arc<dyn ToolEvaluator>, Arc<dyn Summarizer>) = if config.has_api_key() {
        (
            Arc::new(LlmToolEvaluator::new(provider.clone(), &config.models.evaluator, definitions)),
            Arc::new(LlmSummarizer::new(
                provider,
                &config.models.summarizer,
                config.models.temperature,
            )),
        )
    } else {
        warn!("No API key configured, tool evaluation disabled and summaries are offline digests");
        (Arc::new(NoopEvaluator), Arc::new(DigestSummarizer::default()))
    };

    Ok(QueryOrchestrator::new(
        embedder,
        Arc::new(IndexRetriever::new(index, config.retrieval.min_score)),
        evaluator,
        Arc::new(executor),
        summarizer,
        store,
    )
    .with_max_results(config.retrieval.max_results))
}
