//! Single-document ingestion: hash, extract, classify, route, index.

use crate::classifier::Classifier;
use crate::error::{IngestError, IngestResult};
use crate::extractor::{self, Extraction};
use crate::indexer::{ChunkDraft, Indexer};
use crate::router::ChunkRouter;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vellum_core::{Classification, Document, DocumentId, DocumentStatus};
use vellum_metrics::MetricsCollector;
use vellum_store::{LockMode, VectorStore};

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Hashing,
    Extracting,
    Classifying,
    Routing,
    Indexing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Hashing => "hashing",
            Stage::Extracting => "extracting",
            Stage::Classifying => "classifying",
            Stage::Routing => "routing",
            Stage::Indexing => "indexing",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A document that went through every stage.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub document: Document,
    pub classification: Classification,
    pub cache_hit: bool,
    pub strategy_name: String,
    pub chunks: usize,
    /// Older revisions of the same path that were removed.
    pub superseded: usize,
}

/// What happened to one file.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Indexed(IndexedDocument),
    /// Same content already completed and fully embedded.
    Unchanged(Document),
}

impl IngestOutcome {
    pub fn document(&self) -> &Document {
        match self {
            IngestOutcome::Indexed(indexed) => &indexed.document,
            IngestOutcome::Unchanged(document) => document,
        }
    }
}

struct RunState {
    stage: Stage,
    document_id: Option<DocumentId>,
}

/// Drives one file through the pipeline. Stages run strictly in sequence.
pub struct Pipeline {
    classifier: Classifier,
    router: ChunkRouter,
    indexer: Arc<Indexer>,
    metrics: Arc<MetricsCollector>,
}

impl Pipeline {
    pub fn new(
        classifier: Classifier,
        router: ChunkRouter,
        indexer: Arc<Indexer>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            classifier,
            router,
            indexer,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        self.indexer.store()
    }

    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.indexer
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Ingest one file under the blocking lock.
    pub async fn ingest_file(&self, path: &Path) -> IngestResult<IngestOutcome> {
        self.ingest_file_with_progress(path, |_| {}).await
    }

    /// Ingest one file, reporting each stage as it starts.
    ///
    /// On failure a registered document is marked `error` with the message,
    /// and the error is returned for the caller to isolate.
    pub async fn ingest_file_with_progress<F>(
        &self,
        path: &Path,
        mut progress: F,
    ) -> IngestResult<IngestOutcome>
    where
        F: FnMut(Stage) + Send,
    {
        let mut state = RunState {
            stage: Stage::Hashing,
            document_id: None,
        };
        let result = self.run(path, &mut state, &mut progress).await;

        if let Err(e) = &result {
            self.metrics.record_document_failed();
            if let Some(id) = state.document_id {
                if let Err(status_err) = self
                    .store()
                    .set_status(id, DocumentStatus::Error, None, Some(&e.to_string()))
                    .await
                {
                    warn!(document_id = %id, error = %status_err, "Failed to record document error");
                }
            }
            error!(
                file = %path.display(),
                document_id = ?state.document_id,
                stage = state.stage.as_str(),
                error_kind = e.kind(),
                alert = e.is_fatal_alert(),
                error = %e,
                "Document ingestion failed"
            );
        }
        result
    }

    async fn run<F>(
        &self,
        path: &Path,
        state: &mut RunState,
        progress: &mut F,
    ) -> IngestResult<IngestOutcome>
    where
        F: FnMut(Stage) + Send,
    {
        progress(Stage::Hashing);
        let path = std::fs::canonicalize(path)
            .map_err(|e| IngestError::extraction(path, e))?;
        let path_str = path.to_string_lossy().to_string();
        let content_hash = hash_file(&path).await?;

        if let Some(existing) = self.store().find_by_hash(&content_hash).await? {
            if existing.status == DocumentStatus::Completed
                && self.store().chunk_counts(existing.id).await?.fully_embedded()
            {
                debug!(file = %path_str, document_id = %existing.id, "Content already indexed");
                return Ok(IngestOutcome::Unchanged(existing));
            }
        }

        state.stage = Stage::Extracting;
        progress(Stage::Extracting);
        let extraction = extract_blocking(path.clone()).await?;
        if extraction.text.trim().is_empty() {
            self.metrics.record_classification_skipped();
            return Err(IngestError::EmptyDocument(path));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_str.clone());
        let document = self
            .store()
            .register_document(
                &Document::new(&content_hash, file_name, &path_str)
                    .with_metadata(extraction.metadata.clone()),
            )
            .await?;
        state.document_id = Some(document.id);
        self.store()
            .set_status(document.id, DocumentStatus::Processing, None, None)
            .await?;
        info!(
            file = %path_str,
            document_id = %document.id,
            images = extraction.images_count(),
            tables = extraction.tables_count(),
            "Processing document"
        );

        state.stage = Stage::Classifying;
        progress(Stage::Classifying);
        let outcome = self
            .classifier
            .classify(&extraction.text, &extraction.metadata)
            .await?;
        let classification = outcome.classification;

        state.stage = Stage::Routing;
        progress(Stage::Routing);
        let routed = self.router.route(&extraction.text, &classification);
        self.metrics
            .record_route(&routed.strategy_name, routed.fallback);
        debug!(
            document_id = %document.id,
            strategy = %routed.strategy_name,
            chunks = routed.chunks.len(),
            "Routed document"
        );

        state.stage = Stage::Indexing;
        progress(Stage::Indexing);
        let extra = json!({
            "file_path": path_str,
            "domain": classification.domain.label(),
            "category": classification.category.label(),
            "confidence": classification.confidence,
        });
        let drafts: Vec<ChunkDraft> =
            ChunkDraft::from_texts(&document, &routed.chunks, &routed.strategy_name)
                .into_iter()
                .map(|draft| draft.with_extra(&extra))
                .collect();

        let inserted = self
            .indexer
            .index(&document, &drafts, LockMode::Blocking)
            .await?;

        let counts = self.store().chunk_counts(document.id).await?;
        if !counts.fully_embedded() || counts.total as usize != inserted {
            return Err(IngestError::Validation(format!(
                "document {} reports {} of {} chunks embedded after inserting {}",
                document.id, counts.embedded, counts.total, inserted
            )));
        }

        self.store()
            .set_status(
                document.id,
                DocumentStatus::Completed,
                Some(&routed.strategy_name),
                None,
            )
            .await?;
        self.metrics.record_document_processed();

        let superseded = self.supersede(&path_str, document.id).await;

        let document = self
            .store()
            .get_document(document.id)
            .await?
            .ok_or_else(|| IngestError::Validation(format!("document {} vanished", document.id)))?;
        info!(
            file = %path_str,
            document_id = %document.id,
            strategy = %routed.strategy_name,
            chunks = inserted,
            cache_hit = outcome.cache_hit,
            "Document indexed"
        );

        Ok(IngestOutcome::Indexed(IndexedDocument {
            document,
            classification,
            cache_hit: outcome.cache_hit,
            strategy_name: routed.strategy_name,
            chunks: inserted,
            superseded,
        }))
    }

    /// Delete older revisions of a path, each under its own lock.
    ///
    /// Failures are logged; the new revision is already complete.
    async fn supersede(&self, path_str: &str, current: DocumentId) -> usize {
        let revisions = match self.store().documents_at_path(path_str).await {
            Ok(revisions) => revisions,
            Err(e) => {
                warn!(file = %path_str, error = %e, "Could not list older revisions");
                return 0;
            }
        };

        let mut removed = 0;
        for old in revisions.into_iter().filter(|d| d.id != current) {
            match self.indexer.delete_document(old.id, LockMode::Blocking).await {
                Ok(()) => {
                    removed += 1;
                    info!(file = %path_str, document_id = %old.id, "Removed superseded revision");
                }
                Err(e) => {
                    warn!(file = %path_str, document_id = %old.id, error = %e, "Failed to remove superseded revision");
                }
            }
        }
        removed
    }
}

/// SHA-256 of the file bytes, hex encoded.
pub async fn hash_file(path: &Path) -> IngestResult<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| IngestError::extraction(path, e))?;
    Ok(hash_bytes(&bytes))
}

pub(crate) fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Run the blocking extractor off the async workers.
pub async fn extract_blocking(path: PathBuf) -> IngestResult<Extraction> {
    let display = path.clone();
    tokio::task::spawn_blocking(move || extractor::extract(&path))
        .await
        .map_err(|e| IngestError::extraction(display, e))?
}
