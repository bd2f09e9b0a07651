//! Sweep that re-embeds documents whose chunks lack vectors.
//!
//! Locks are taken in non-blocking mode: a document the watcher is working on
//! is skipped and picked up by a later sweep.

use crate::error::{IngestError, IngestResult};
use crate::indexer::{ChunkDraft, Indexer};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use vellum_core::{Coverage, Document, DocumentStatus};
use vellum_metrics::MetricsCollector;
use vellum_store::{LockMode, LockedDocument};

/// Default number of candidates fetched per sweep.
pub const DEFAULT_BATCH_LIMIT: i64 = 500;

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillSummary {
    pub candidates: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub coverage: Coverage,
}

impl BackfillSummary {
    pub fn coverage_percent(&self) -> f64 {
        self.coverage.percent()
    }
}

enum DocumentOutcome {
    Reembedded(usize),
    AlreadyComplete,
}

/// One-shot sweep over documents missing embeddings.
pub struct Backfill {
    indexer: Arc<Indexer>,
    metrics: Arc<MetricsCollector>,
    limit: i64,
}

impl Backfill {
    pub fn new(indexer: Arc<Indexer>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            indexer,
            metrics,
            limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Sweep once. Per-document failures are counted, not returned.
    pub async fn run(&self) -> IngestResult<BackfillSummary> {
        let store = self.indexer.store();
        let candidates = store.documents_missing_embeddings(self.limit).await?;
        let mut summary = BackfillSummary {
            candidates: candidates.len(),
            ..BackfillSummary::default()
        };
        info!(candidates = candidates.len(), "Backfill sweep started");

        for document in &candidates {
            match self.backfill_document(document).await {
                Ok(DocumentOutcome::Reembedded(chunks)) => {
                    summary.processed += 1;
                    info!(document_id = %document.id, file = %document.file_path, chunks, "Backfilled document");
                }
                Ok(DocumentOutcome::AlreadyComplete) => {
                    summary.skipped += 1;
                    info!(document_id = %document.id, "skipped, already fully embedded");
                }
                Err(IngestError::LockContention(_)) => {
                    summary.skipped += 1;
                    self.metrics.record_lock_skip();
                    info!(document_id = %document.id, file = %document.file_path, "skipped, locked by watcher");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        document_id = %document.id,
                        file = %document.file_path,
                        error_kind = e.kind(),
                        alert = e.is_fatal_alert(),
                        error = %e,
                        "Backfill failed for document"
                    );
                }
            }
        }

        summary.coverage = store.coverage().await?;
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            coverage_pct = summary.coverage_percent(),
            "Backfill sweep finished"
        );
        Ok(summary)
    }

    async fn backfill_document(&self, document: &Document) -> IngestResult<DocumentOutcome> {
        let mut lock = self.indexer.lock(document.id, LockMode::NonBlocking).await?;
        let result = self.reembed_locked(lock.as_mut(), document).await;
        self.indexer.unlock(lock).await;
        result
    }

    async fn reembed_locked(
        &self,
        lock: &mut dyn LockedDocument,
        document: &Document,
    ) -> IngestResult<DocumentOutcome> {
        let store = self.indexer.store();

        // The watcher may have finished this document since the candidate list was read.
        let counts = store.chunk_counts(document.id).await?;
        if counts.total == 0 || counts.fully_embedded() {
            return Ok(DocumentOutcome::AlreadyComplete);
        }

        let drafts: Vec<ChunkDraft> = store
            .chunks_for_document(document.id)
            .await?
            .into_iter()
            .map(|chunk| ChunkDraft {
                chunk_index: chunk.chunk_index,
                content: chunk.content,
                metadata: chunk.metadata,
            })
            .collect();

        let inserted = self.indexer.index_locked(lock, document, &drafts).await?;
        store
            .set_status(document.id, DocumentStatus::Completed, None, None)
            .await?;
        Ok(DocumentOutcome::Reembedded(inserted))
    }
}
