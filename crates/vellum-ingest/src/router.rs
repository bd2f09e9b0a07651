//! Maps a classification to a chunking strategy and applies it.

use crate::chunker::{ChunkConfig, Chunker};
use crate::error::{IngestError, IngestResult};
use tracing::warn;
use vellum_config::{ChunkingConfig, ClassificationConfig};
use vellum_core::{ChunkingStrategy, Classification, StructuralCategory};

/// Strategy picked for one document and the chunks it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub strategy: ChunkingStrategy,
    /// Recorded on the document: `recursive`, `table_aware`, or `fallback::<name>`.
    pub strategy_name: String,
    pub fallback: bool,
    pub chunks: Vec<String>,
}

/// Deterministic classification-to-strategy router.
#[derive(Debug, Clone)]
pub struct ChunkRouter {
    chunker: Chunker,
    threshold: f32,
    fallback: ChunkingStrategy,
}

impl ChunkRouter {
    pub fn new(chunker: Chunker, threshold: f32, fallback: ChunkingStrategy) -> Self {
        Self {
            chunker,
            threshold,
            fallback,
        }
    }

    pub fn from_config(
        chunking: &ChunkingConfig,
        classification: &ClassificationConfig,
    ) -> IngestResult<Self> {
        let fallback = chunking
            .fallback_strategy
            .parse::<ChunkingStrategy>()
            .map_err(|e| IngestError::Config(e.to_string()))?;
        Ok(Self::new(
            Chunker::new(ChunkConfig::from_config(chunking)),
            classification.confidence_threshold,
            fallback,
        ))
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// The strategy for a classification, and whether it is the fallback.
    pub fn select(&self, classification: &Classification) -> (ChunkingStrategy, bool) {
        if !classification.is_confident(self.threshold) {
            return (self.fallback, true);
        }
        match classification.category {
            StructuralCategory::DenseAcademicText => (ChunkingStrategy::Recursive, false),
            StructuralCategory::MixedScientificPaper | StructuralCategory::TabularDocument => {
                (ChunkingStrategy::TableAware, false)
            }
            StructuralCategory::Narrative | StructuralCategory::Other => (self.fallback, true),
        }
    }

    pub fn strategy_name(strategy: ChunkingStrategy, fallback: bool) -> String {
        if fallback {
            format!("fallback::{}", strategy.as_str())
        } else {
            strategy.as_str().to_string()
        }
    }

    /// Select a strategy and split `text` with it.
    ///
    /// Non-empty text always yields at least one chunk.
    pub fn route(&self, text: &str, classification: &Classification) -> Routed {
        let (strategy, fallback) = self.select(classification);
        let mut chunks = self.chunker.split(strategy, text);

        let trimmed = text.trim();
        if chunks.is_empty() && !trimmed.is_empty() {
            warn!(
                strategy = strategy.as_str(),
                chars = trimmed.len(),
                "Strategy produced no chunks for non-empty text; keeping text as one chunk"
            );
            chunks.push(trimmed.to_string());
        }

        Routed {
            strategy,
            strategy_name: Self::strategy_name(strategy, fallback),
            fallback,
            chunks,
        }
    }
}
