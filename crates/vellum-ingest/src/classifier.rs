//! Cache-shielded document classification.

use crate::error::{IngestError, IngestResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use vellum_cache::{cache_key, ClassificationCache};
use vellum_core::{Classification, ContentDomain, StructuralCategory};
use vellum_metrics::MetricsCollector;
use vellum_ollama::{ClassificationBackend, OllamaError, RetryPolicy};

/// Result of one classification request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyOutcome {
    pub classification: Classification,
    /// Served from the cache without a remote call.
    pub cache_hit: bool,
    /// The model answered but its output could not be parsed.
    pub unparsed: bool,
}

/// Classifier wrapping a remote backend with a cache and retry policy.
///
/// Cache failures never fail classification; they are logged, counted and
/// the request goes straight to the backend.
pub struct Classifier {
    backend: Arc<dyn ClassificationBackend>,
    cache: ClassificationCache,
    retry: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

impl Classifier {
    pub fn new(
        backend: Arc<dyn ClassificationBackend>,
        cache: ClassificationCache,
        retry: RetryPolicy,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            backend,
            cache,
            retry,
            metrics,
        }
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    /// Classify extracted text.
    ///
    /// Identical `(text, metadata)` pairs are answered from the cache while
    /// the entry lives.
    pub async fn classify(
        &self,
        text: &str,
        metadata: &serde_json::Value,
    ) -> IngestResult<ClassifyOutcome> {
        if text.trim().is_empty() {
            self.metrics.record_classification_skipped();
            return Err(IngestError::Validation(
                "refusing to classify empty text".to_string(),
            ));
        }

        let key = cache_key(text, metadata);
        let mut cache_usable = self.cache.is_enabled();
        let mut missed = false;

        if cache_usable {
            match self.cache.get(&key).await {
                Ok(Some(classification)) => {
                    self.metrics.record_cache_hit();
                    debug!(key = %key, "Classification cache hit");
                    return Ok(ClassifyOutcome {
                        classification,
                        cache_hit: true,
                        unparsed: false,
                    });
                }
                Ok(None) => missed = true,
                Err(e) => {
                    self.metrics.record_cache_error();
                    warn!(error = %e, backend = self.cache.backend_name(), "Classification cache unavailable; calling classifier directly");
                    cache_usable = false;
                }
            }
        }

        let started = Instant::now();
        let backend = &self.backend;
        let result = self
            .retry
            .run("classify", || backend.classify(text, metadata))
            .await;
        let elapsed = started.elapsed();

        let classification = match result {
            Ok(classification) => classification,
            Err(e) if matches!(e.root(), OllamaError::ParseError(_)) => {
                self.metrics.record_classification_failure(elapsed);
                warn!(error = %e, "Unparseable classifier output; using fallback classification");
                return Ok(ClassifyOutcome {
                    classification: unparsed_fallback(),
                    cache_hit: false,
                    unparsed: true,
                });
            }
            Err(e) => {
                self.metrics.record_classification_failure(elapsed);
                let err = IngestError::from(e);
                if err.is_fatal_alert() {
                    self.metrics.record_auth_failure();
                    error!(alert = true, error_kind = err.kind(), error = %err, "Classifier rejected credentials");
                }
                return Err(err);
            }
        };

        self.metrics.record_classification_success(elapsed);
        // Misses only count once the remote call has produced an answer.
        if missed {
            self.metrics.record_cache_miss();
        }
        info!(
            domain = %classification.domain,
            category = %classification.category,
            confidence = classification.confidence,
            latency_ms = elapsed.as_millis() as u64,
            "Classified document"
        );

        if cache_usable {
            if let Err(e) = self.cache.put(&key, &classification).await {
                self.metrics.record_cache_error();
                warn!(error = %e, "Failed to store classification in cache");
            }
        }

        Ok(ClassifyOutcome {
            classification,
            cache_hit: false,
            unparsed: false,
        })
    }
}

/// Stand-in for a response that could not be parsed. Zero confidence routes
/// it to the fallback strategy.
fn unparsed_fallback() -> Classification {
    Classification::new(
        ContentDomain::Other,
        StructuralCategory::Other,
        0.0,
        "classifier output could not be parsed",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_classification, FailingCacheStore, RetryLog, ScriptedClassifier};
    use std::time::Duration;
    use vellum_cache::MemoryCacheStore;

    fn classifier(backend: Arc<ScriptedClassifier>, cache: ClassificationCache) -> (Classifier, Arc<MetricsCollector>) {
        let metrics = Arc::new(MetricsCollector::new());
        let retry = RetryPolicy::default().with_jitter(0.0);
        (Classifier::new(backend, cache, retry, metrics.clone()), metrics)
    }

    fn memory_cache() -> ClassificationCache {
        ClassificationCache::new(Arc::new(MemoryCacheStore::new()), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_second_identical_request_is_a_hit() {
        let backend = Arc::new(ScriptedClassifier::always(sample_classification(0.92)));
        let (classifier, metrics) = classifier(backend.clone(), memory_cache());
        let meta = serde_json::json!({"tables_count": 0, "images_count": 1});

        let first = classifier.classify("Quantum dots emit light.", &meta).await.unwrap();
        assert!(!first.cache_hit);

        let started = Instant::now();
        let second = classifier.classify("Quantum dots emit light.", &meta).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(10));

        assert!(second.cache_hit);
        assert_eq!(
            serde_json::to_string(&first.classification).unwrap(),
            serde_json::to_string(&second.classification).unwrap()
        );
        assert_eq!(backend.calls(), 1);

        let snap = metrics.snapshot();
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 1);
        assert_eq!(snap.classification_success, 1);
    }

    #[tokio::test]
    async fn test_unavailable_cache_degrades_to_direct_call() {
        let backend = Arc::new(ScriptedClassifier::always(sample_classification(0.9)));
        let cache = ClassificationCache::new(Arc::new(FailingCacheStore), Duration::from_secs(60));
        let (classifier, metrics) = classifier(backend.clone(), cache);

        let outcome = classifier
            .classify("Text", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(!outcome.cache_hit);
        assert_eq!(backend.calls(), 1);

        let snap = metrics.snapshot();
        assert_eq!(snap.cache_errors, 1);
        assert_eq!(snap.classification_failure, 0);
        assert_eq!(snap.classification_success, 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_counts() {
        let backend = Arc::new(ScriptedClassifier::always(sample_classification(0.9)));
        let (classifier, metrics) = classifier(backend.clone(), ClassificationCache::disabled());

        classifier.classify("Text", &serde_json::json!({})).await.unwrap();
        classifier.classify("Text", &serde_json::json!({})).await.unwrap();
        assert_eq!(backend.calls(), 2);

        let snap = metrics.snapshot();
        assert_eq!(snap.cache_hits + snap.cache_misses + snap.cache_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_retried_then_succeed() {
        use tracing_subscriber::layer::SubscriberExt;

        let log = RetryLog::default();
        let subscriber = tracing_subscriber::registry().with(log.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let backend = Arc::new(ScriptedClassifier::new(vec![
            Err(OllamaError::Timeout { seconds: 60 }),
            Err(OllamaError::Timeout { seconds: 60 }),
            Err(OllamaError::Timeout { seconds: 60 }),
            Ok(sample_classification(0.9)),
        ]));
        let (classifier, _metrics) = classifier(backend.clone(), memory_cache());

        let started = tokio::time::Instant::now();
        let outcome = classifier.classify("Text", &serde_json::json!({})).await.unwrap();
        assert_eq!(outcome.classification, sample_classification(0.9));
        assert_eq!(backend.calls(), 4);
        // 1s + 2.5s + 6.25s of backoff
        assert!(started.elapsed() >= Duration::from_millis(9_750));

        let delays = log.delays_ms();
        assert_eq!(delays, vec![1_000, 2_500, 6_250]);
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_is_fatal_and_not_retried() {
        let backend = Arc::new(ScriptedClassifier::new(vec![Err(
            OllamaError::Authentication {
                status: 401,
                message: "invalid api key".into(),
            },
        )]));
        let (classifier, metrics) = classifier(backend.clone(), memory_cache());

        let err = classifier
            .classify("Text", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.is_fatal_alert());
        assert_eq!(backend.calls(), 1);

        let snap = metrics.snapshot();
        assert_eq!(snap.auth_failures, 1);
        assert_eq!(snap.classification_failure, 1);
        assert_eq!(snap.cache_misses, 0);
    }

    #[tokio::test]
    async fn test_unparsed_output_falls_back_and_is_not_cached() {
        let backend = Arc::new(ScriptedClassifier::new(vec![
            Err(OllamaError::ParseError("no json".into())),
            Ok(sample_classification(0.95)),
        ]));
        let (classifier, metrics) = classifier(backend.clone(), memory_cache());
        let meta = serde_json::json!({});

        let first = classifier.classify("Text", &meta).await.unwrap();
        assert!(first.unparsed);
        assert_eq!(first.classification.confidence, 0.0);

        let second = classifier.classify("Text", &meta).await.unwrap();
        assert!(!second.cache_hit);
        assert_eq!(second.classification, sample_classification(0.95));
        let snap = metrics.snapshot();
        assert_eq!(snap.classification_failure, 1);
        assert_eq!(snap.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_empty_text_is_skipped() {
        let backend = Arc::new(ScriptedClassifier::always(sample_classification(0.9)));
        let (classifier, metrics) = classifier(backend.clone(), memory_cache());

        assert!(classifier.classify("  \n", &serde_json::json!({})).await.is_err());
        assert_eq!(backend.calls(), 0);
        assert_eq!(metrics.snapshot().classification_skipped, 1);
    }
}
