//! Vellum Ingest - Document ingestion and indexing pipeline.
//!
//! This crate provides:
//! - Text and structure extraction (PDF, Markdown, plain text, CSV/TSV)
//! - Cache-shielded classification with retries
//! - Classification-driven chunking strategies
//! - Embedding and exactly-once chunk writes under advisory locks
//! - A polling directory watcher and a non-blocking backfill sweep

mod backfill;
mod chunker;
mod classifier;
mod error;
pub mod extractor;
mod indexer;
mod pipeline;
mod router;
mod status;
mod tables;
mod watcher;

#[cfg(test)]
mod testing;

pub use backfill::{Backfill, BackfillSummary, DEFAULT_BATCH_LIMIT};
pub use chunker::{ChunkConfig, Chunker};
pub use classifier::{Classifier, ClassifyOutcome};
pub use error::{IngestError, IngestResult};
pub use extractor::{extract, Extraction};
pub use indexer::{ChunkDraft, Indexer};
pub use pipeline::{
    extract_blocking, hash_file, IndexedDocument, IngestOutcome, Pipeline, Stage,
};
pub use router::{ChunkRouter, Routed};
pub use status::{status_for_path, status_report, JobState, StatusReport};
pub use watcher::{CycleReport, WatchState, Watcher, WatcherConfig};
