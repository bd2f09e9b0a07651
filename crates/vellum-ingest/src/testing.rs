//! Scripted collaborators for pipeline tests.

use crate::chunker::{ChunkConfig, Chunker};
use crate::classifier::Classifier;
use crate::indexer::Indexer;
use crate::pipeline::Pipeline;
use crate::router::ChunkRouter;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use vellum_cache::{CacheError, CacheResult, CacheStore, ClassificationCache, MemoryCacheStore};
use vellum_core::{
    Chunk, ChunkCounts, ChunkId, ChunkingStrategy, Classification, ContentDomain, Coverage,
    Document, DocumentId, DocumentStatus, EmbeddedChunk, StructuralCategory,
};
use vellum_metrics::MetricsCollector;
use vellum_ollama::{
    ClassificationBackend, EmbeddingBackend, OllamaError, OllamaResult, RetryPolicy,
};
use vellum_store::{LockMode, LockedDocument, MemoryVectorStore, StoreResult, VectorStore};

pub(crate) fn sample_classification(confidence: f32) -> Classification {
    Classification::new(
        ContentDomain::Physics,
        StructuralCategory::DenseAcademicText,
        confidence,
        "continuous prose with citations",
    )
}

/// A pipeline over `store` with default chunking, a memory cache and no retries.
pub(crate) fn pipeline_with(
    store: impl VectorStore + 'static,
    backend: Arc<ScriptedClassifier>,
    embedder: ScriptedEmbedder,
) -> (Pipeline, Arc<MetricsCollector>) {
    let metrics = Arc::new(MetricsCollector::new());
    let cache = ClassificationCache::new(
        Arc::new(MemoryCacheStore::new()),
        Duration::from_secs(3600),
    );
    let classifier = Classifier::new(backend, cache, RetryPolicy::none(), metrics.clone());
    let router = ChunkRouter::new(
        Chunker::new(ChunkConfig::default()),
        0.85,
        ChunkingStrategy::Paragraph,
    );
    let indexer = Indexer::new(
        Arc::new(store),
        Arc::new(embedder),
        RetryPolicy::none(),
        metrics.clone(),
    )
    .unwrap();
    (
        Pipeline::new(classifier, router, Arc::new(indexer), metrics.clone()),
        metrics,
    )
}

/// Plays back a script of results, then repeats `fallback` if set.
pub(crate) struct ScriptedClassifier {
    script: Mutex<VecDeque<OllamaResult<Classification>>>,
    fallback: Option<Classification>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub(crate) fn new(script: Vec<OllamaResult<Classification>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn always(classification: Classification) -> Self {
        Self {
            fallback: Some(classification),
            ..Self::new(vec![])
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassificationBackend for ScriptedClassifier {
    async fn classify(
        &self,
        _text: &str,
        _metadata: &serde_json::Value,
    ) -> OllamaResult<Classification> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(result), _) => result,
            (None, Some(classification)) => Ok(classification.clone()),
            (None, None) => Err(OllamaError::Connection("script exhausted".into())),
        }
    }
}

/// Deterministic embedder. Fails with queued errors first. An optional gate
/// holds the first call until the test lets it through.
pub(crate) struct ScriptedEmbedder {
    dimensions: usize,
    failures: Mutex<VecDeque<OllamaError>>,
    calls: Arc<AtomicUsize>,
    gate: Mutex<Option<Arc<EmbedGate>>>,
}

/// Lets a test observe that an embedding call started and decide when it finishes.
#[derive(Default)]
pub(crate) struct EmbedGate {
    pub(crate) entered: Notify,
    pub(crate) proceed: Notify,
}

impl ScriptedEmbedder {
    pub(crate) fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            failures: Mutex::new(VecDeque::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            gate: Mutex::new(None),
        }
    }

    pub(crate) fn with_failures(self, failures: Vec<OllamaError>) -> Self {
        *self.failures.lock().unwrap() = failures.into();
        self
    }

    pub(crate) fn with_gate(self, gate: Arc<EmbedGate>) -> Self {
        *self.gate.lock().unwrap() = Some(gate);
        self
    }

    pub(crate) fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl EmbeddingBackend for ScriptedEmbedder {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> OllamaResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.proceed.notified().await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(texts
            .iter()
            .map(|text| {
                let seed = text.len() as f32;
                (0..self.dimensions).map(|i| (seed + i as f32) / 100.0).collect()
            })
            .collect())
    }
}

/// A cache store whose every operation fails.
pub(crate) struct FailingCacheStore;

#[async_trait]
impl CacheStore for FailingCacheStore {
    fn name(&self) -> &'static str {
        "failing"
    }
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(CacheError::Other("connection refused".into()))
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Other("connection refused".into()))
    }
    async fn delete(&self, _key: &str) -> CacheResult<bool> {
        Err(CacheError::Other("connection refused".into()))
    }
    async fn flush(&self) -> CacheResult<usize> {
        Err(CacheError::Other("connection refused".into()))
    }
    async fn ping(&self) -> CacheResult<()> {
        Err(CacheError::Other("connection refused".into()))
    }
}

/// Wraps the memory store so that every chunk write acknowledges one row fewer
/// than it was given.
pub(crate) struct ShortChangingStore {
    inner: MemoryVectorStore,
}

impl ShortChangingStore {
    pub(crate) fn new(inner: MemoryVectorStore) -> Self {
        Self { inner }
    }
}

struct ShortChangingLock {
    inner: Box<dyn LockedDocument>,
}

#[async_trait]
impl LockedDocument for ShortChangingLock {
    fn document_id(&self) -> DocumentId {
        self.inner.document_id()
    }

    async fn replace_chunks(&mut self, chunks: &[EmbeddedChunk]) -> StoreResult<Vec<ChunkId>> {
        let mut ids = self.inner.replace_chunks(chunks).await?;
        ids.pop();
        Ok(ids)
    }

    async fn delete_document(&mut self) -> StoreResult<()> {
        self.inner.delete_document().await
    }

    async fn release(self: Box<Self>) -> StoreResult<()> {
        self.inner.release().await
    }
}

#[async_trait]
impl VectorStore for ShortChangingStore {
    fn name(&self) -> &'static str {
        "short-changing"
    }
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
    async fn register_document(&self, document: &Document) -> StoreResult<Document> {
        self.inner.register_document(document).await
    }
    async fn get_document(&self, id: DocumentId) -> StoreResult<Option<Document>> {
        self.inner.get_document(id).await
    }
    async fn find_by_hash(&self, content_hash: &str) -> StoreResult<Option<Document>> {
        self.inner.find_by_hash(content_hash).await
    }
    async fn documents_at_path(&self, file_path: &str) -> StoreResult<Vec<Document>> {
        self.inner.documents_at_path(file_path).await
    }
    async fn list_documents(&self, limit: i64) -> StoreResult<Vec<Document>> {
        self.inner.list_documents(limit).await
    }
    async fn set_status(
        &self,
        id: DocumentId,
        status: DocumentStatus,
        chunking_strategy: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        self.inner.set_status(id, status, chunking_strategy, error).await
    }
    async fn documents_missing_embeddings(&self, limit: i64) -> StoreResult<Vec<Document>> {
        self.inner.documents_missing_embeddings(limit).await
    }
    async fn chunks_for_document(&self, id: DocumentId) -> StoreResult<Vec<Chunk>> {
        self.inner.chunks_for_document(id).await
    }
    async fn chunk_counts(&self, id: DocumentId) -> StoreResult<ChunkCounts> {
        self.inner.chunk_counts(id).await
    }
    async fn coverage(&self) -> StoreResult<Coverage> {
        self.inner.coverage().await
    }
    async fn acquire_lock(
        &self,
        id: DocumentId,
        mode: LockMode,
    ) -> StoreResult<Option<Box<dyn LockedDocument>>> {
        Ok(self
            .inner
            .acquire_lock(id, mode)
            .await?
            .map(|inner| Box::new(ShortChangingLock { inner }) as Box<dyn LockedDocument>))
    }
}

/// Records the `delay_ms` of every "Retrying after transient failure" event.
#[derive(Clone, Default)]
pub(crate) struct RetryLog {
    delays_ms: Arc<Mutex<Vec<u64>>>,
}

impl RetryLog {
    pub(crate) fn delays_ms(&self) -> Vec<u64> {
        self.delays_ms.lock().unwrap().clone()
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for RetryLog {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = RetryVisitor::default();
        event.record(&mut visitor);
        if visitor.message.as_deref() == Some("Retrying after transient failure") {
            if let Some(delay) = visitor.delay_ms {
                self.delays_ms.lock().unwrap().push(delay);
            }
        }
    }
}

#[derive(Default)]
struct RetryVisitor {
    message: Option<String>,
    delay_ms: Option<u64>,
}

impl tracing::field::Visit for RetryVisitor {
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        if field.name() == "delay_ms" {
            self.delay_ms = Some(value);
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        }
    }
}
