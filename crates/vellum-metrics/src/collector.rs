//! The metrics collector and its serializable snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Number of recent classification latencies kept for percentile estimation.
const LATENCY_WINDOW: usize = 4096;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Nearest-rank percentile over an ascending slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Process-wide pipeline counters.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    documents_processed: AtomicU64,
    documents_failed: AtomicU64,
    classification_success: AtomicU64,
    classification_failure: AtomicU64,
    classification_skipped: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,
    routes_total: AtomicU64,
    fallback_routes: AtomicU64,
    chunks_indexed: AtomicU64,
    index_failures: AtomicU64,
    lock_skips: AtomicU64,
    auth_failures: AtomicU64,
    latencies_ms: Mutex<VecDeque<f64>>,
    strategies: Mutex<BTreeMap<String, u64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_document_processed(&self) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_document_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A remote classification call succeeded after `latency`.
    pub fn record_classification_success(&self, latency: Duration) {
        self.classification_success.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// A remote classification call failed for good after `latency`.
    pub fn record_classification_failure(&self, latency: Duration) {
        self.classification_failure.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// Classification was not attempted (empty text).
    pub fn record_classification_skipped(&self) {
        self.classification_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A routing decision was made.
    pub fn record_route(&self, strategy_name: &str, fallback: bool) {
        self.routes_total.fetch_add(1, Ordering::Relaxed);
        if fallback {
            self.fallback_routes.fetch_add(1, Ordering::Relaxed);
        }
        *lock(&self.strategies)
            .entry(strategy_name.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_chunks_indexed(&self, count: usize) {
        self.chunks_indexed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_index_failure(&self) {
        self.index_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_skip(&self) {
        self.lock_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        let mut window = lock(&self.latencies_ms);
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(latency.as_secs_f64() * 1000.0);
    }

    /// Zero every counter and drop recorded latencies.
    pub fn reset(&self) {
        for counter in [
            &self.documents_processed,
            &self.documents_failed,
            &self.classification_success,
            &self.classification_failure,
            &self.classification_skipped,
            &self.cache_hits,
            &self.cache_misses,
            &self.cache_errors,
            &self.routes_total,
            &self.fallback_routes,
            &self.chunks_indexed,
            &self.index_failures,
            &self.lock_skips,
            &self.auth_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        lock(&self.latencies_ms).clear();
        lock(&self.strategies).clear();
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = {
            let window = lock(&self.latencies_ms);
            let mut sorted: Vec<f64> = window.iter().copied().collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            LatencySummary {
                count: sorted.len() as u64,
                p50_ms: percentile(&sorted, 50.0),
                p95_ms: percentile(&sorted, 95.0),
                p99_ms: percentile(&sorted, 99.0),
            }
        };

        let classification_success = self.classification_success.load(Ordering::Relaxed);
        let classification_failure = self.classification_failure.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let routes_total = self.routes_total.load(Ordering::Relaxed);
        let fallback_routes = self.fallback_routes.load(Ordering::Relaxed);

        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            classification_success,
            classification_failure,
            classification_skipped: self.classification_skipped.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            routes_total,
            fallback_routes,
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            index_failures: self.index_failures.load(Ordering::Relaxed),
            lock_skips: self.lock_skips.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            cache_hit_rate: ratio(cache_hits, cache_hits + cache_misses),
            fallback_ratio: ratio(fallback_routes, routes_total),
            classification_failure_ratio: ratio(
                classification_failure,
                classification_success + classification_failure,
            ),
            classification_latency: latency,
            strategy_usage: lock(&self.strategies).clone(),
        }
    }
}

/// Percentiles over the recent classification-call window, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Point-in-time copy of every metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub documents_processed: u64,
    pub documents_failed: u64,
    pub classification_success: u64,
    pub classification_failure: u64,
    pub classification_skipped: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,
    pub routes_total: u64,
    pub fallback_routes: u64,
    pub chunks_indexed: u64,
    pub index_failures: u64,
    pub lock_skips: u64,
    pub auth_failures: u64,
    pub cache_hit_rate: f64,
    pub fallback_ratio: f64,
    pub classification_failure_ratio: f64,
    pub classification_latency: LatencySummary,
    pub strategy_usage: BTreeMap<String, u64>,
}
