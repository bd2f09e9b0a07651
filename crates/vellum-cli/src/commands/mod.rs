//! CLI command implementations.

pub mod backfill;
pub mod cache;
pub mod config;
pub mod ingest;
pub mod init;
pub mod status;
pub mod watch;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::warn;
use vellum_cache::ClassificationCache;
use vellum_config::{AppPaths, Config};
use vellum_ingest::{ChunkRouter, Classifier, Indexer, Pipeline};
use vellum_metrics::MetricsCollector;
use vellum_ollama::{OllamaClassifier, OllamaEmbedder, RetryPolicy};
use vellum_store::{PgVectorStore, VectorStore};

/// Get the application paths.
pub fn get_paths() -> Result<AppPaths> {
    AppPaths::new().context("Failed to determine application directories")
}

/// Load the configuration and the paths it resolves to.
pub fn load_config() -> Result<(Config, AppPaths)> {
    let config = Config::load().context("Failed to load configuration")?;
    let paths = config.paths().context("Failed to resolve data directory")?;
    Ok((config, paths))
}

/// Create the async runtime for a command.
pub fn runtime() -> Result<Runtime> {
    Runtime::new().context("Failed to create async runtime")
}

/// Connect to Postgres and make sure the schema exists.
pub async fn connect_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let store = PgVectorStore::connect(
        &config.storage.postgres_url,
        config.storage.max_connections,
        config.storage.lock_namespace.clone(),
        config.ollama.embedding_dimensions,
    )
    .await
    .context("Failed to connect to the vector store")?;
    Ok(Arc::new(store))
}

/// Open the configured cache, degrading to no cache if it is unreachable.
pub async fn open_cache(config: &Config, paths: &AppPaths) -> ClassificationCache {
    match ClassificationCache::from_config(&config.cache, &config.cache_path(paths)).await {
        Ok(cache) => cache,
        Err(e) => {
            warn!(error = %e, "Classification cache unavailable; continuing without it");
            ClassificationCache::disabled()
        }
    }
}

pub fn build_indexer(
    config: &Config,
    store: Arc<dyn VectorStore>,
    metrics: Arc<MetricsCollector>,
) -> Result<Arc<Indexer>> {
    let embedder = OllamaEmbedder::from_config(&config.ollama)
        .context("Failed to create embedding client")?;
    let indexer = Indexer::new(
        store,
        Arc::new(embedder),
        RetryPolicy::from_config(&config.retry),
        metrics,
    )?;
    Ok(Arc::new(indexer))
}

/// Wire every stage of the pipeline from configuration.
pub async fn build_pipeline(
    config: &Config,
    paths: &AppPaths,
    metrics: Arc<MetricsCollector>,
) -> Result<Pipeline> {
    let store = connect_store(config).await?;
    let indexer = build_indexer(config, store, metrics.clone())?;

    let backend = OllamaClassifier::from_config(&config.ollama, &config.classification)
        .context("Failed to create classification client")?;
    let classifier = Classifier::new(
        Arc::new(backend),
        open_cache(config, paths).await,
        RetryPolicy::from_config(&config.retry),
        metrics.clone(),
    );
    let router = ChunkRouter::from_config(&config.chunking, &config.classification)?;

    Ok(Pipeline::new(classifier, router, indexer, metrics))
}
