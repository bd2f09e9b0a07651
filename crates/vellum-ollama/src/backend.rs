//! Trait seams for the classifier and embedder, with Ollama implementations.

use crate::classify::{build_classification_prompt, parse_classification, SYSTEM_PROMPT};
use crate::client::OllamaClient;
use crate::error::{OllamaError, OllamaResult};
use crate::types::{GenerateOptions, GenerateRequest};
use async_trait::async_trait;
use tracing::debug;
use vellum_config::{ClassificationConfig, OllamaConfig};
use vellum_core::Classification;

/// Something that can label a document's domain and structure.
#[async_trait]
pub trait ClassificationBackend: Send + Sync {
    /// Classify extracted text. `metadata` carries structural hints such as
    /// `tables_count` and `images_count`.
    async fn classify(
        &self,
        text: &str,
        metadata: &serde_json::Value,
    ) -> OllamaResult<Classification>;
}

/// Something that turns text into fixed-width vectors.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn model_name(&self) -> &str;

    /// Width of every vector this backend returns.
    fn dimensions(&self) -> usize;

    /// Embed a batch, returning one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> OllamaResult<Vec<Vec<f32>>>;
}

/// Classifier backed by an Ollama chat model in JSON mode.
#[derive(Clone)]
pub struct OllamaClassifier {
    client: OllamaClient,
    model: String,
    max_chars: usize,
}

impl OllamaClassifier {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_chars: ClassificationConfig::default().max_chars,
        }
    }

    pub fn from_config(
        ollama: &OllamaConfig,
        classification: &ClassificationConfig,
    ) -> OllamaResult<Self> {
        let client = OllamaClient::from_config(ollama)?;
        Ok(Self::new(client, &ollama.model).with_max_chars(classification.max_chars))
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ClassificationBackend for OllamaClassifier {
    async fn classify(
        &self,
        text: &str,
        metadata: &serde_json::Value,
    ) -> OllamaResult<Classification> {
        let prompt = build_classification_prompt(text, metadata, self.max_chars);
        let request = GenerateRequest::new(&self.model, prompt)
            .with_system(SYSTEM_PROMPT)
            .with_json_format()
            .with_options(GenerateOptions::new().with_temperature(0.0));

        let response = self.client.generate(request).await?;
        debug!(model = %self.model, chars = response.response.len(), "Classifier responded");
        parse_classification(&response.response)
    }
}

/// Embedder backed by Ollama's batch embedding endpoint.
#[derive(Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
        }
    }

    pub fn from_config(config: &OllamaConfig) -> OllamaResult<Self> {
        if config.embedding_dimensions == 0 {
            return Err(OllamaError::InvalidConfig(
                "ollama.embedding_dimensions must be positive".to_string(),
            ));
        }
        let client = OllamaClient::from_config(config)?;
        Ok(Self::new(
            client,
            &config.embedding_model,
            config.embedding_dimensions,
        ))
    }
}

/// Check that a batch response lines up with its request.
pub(crate) fn check_embeddings(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimensions: usize,
) -> OllamaResult<()> {
    if vectors.len() != expected_count {
        return Err(OllamaError::CountMismatch {
            expected: expected_count,
            actual: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(OllamaError::DimensionMismatch {
            expected: dimensions,
            actual: bad.len(),
        });
    }
    Ok(())
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> OllamaResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.client.embed(&self.model, texts).await?;
        check_embeddings(&vectors, texts.len(), self.dimensions)?;
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_embeddings() {
        let ok = vec![vec![0.0; 3], vec![1.0; 3]];
        assert!(check_embeddings(&ok, 2, 3).is_ok());

        assert!(matches!(
            check_embeddings(&ok, 3, 3),
            Err(OllamaError::CountMismatch { expected: 3, actual: 2 })
        ));

        let ragged = vec![vec![0.0; 3], vec![1.0; 4]];
        assert!(matches!(
            check_embeddings(&ragged, 2, 3),
            Err(OllamaError::DimensionMismatch { expected: 3, actual: 4 })
        ));
    }

    #[test]
    fn test_from_config() {
        let config = OllamaConfig::default();
        let embedder = OllamaEmbedder::from_config(&config).unwrap();
        assert_eq!(embedder.model_name(), "nomic-embed-text");
        assert_eq!(embedder.dimensions(), 768);

        let classifier =
            OllamaClassifier::from_config(&config, &ClassificationConfig::default()).unwrap();
        assert_eq!(classifier.model(), "llama3.1:8b");

        let zero = OllamaConfig {
            embedding_dimensions: 0,
            ..OllamaConfig::default()
        };
        assert!(OllamaEmbedder::from_config(&zero).is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let client = OllamaClient::new("http://127.0.0.1:9").unwrap();
        let embedder = OllamaEmbedder::new(client, "nomic-embed-text", 768);
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
    }
}
