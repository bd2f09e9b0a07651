//! Structured and line-oriented renderings of a snapshot.

use crate::collector::MetricsSnapshot;
use std::fmt::Write;

const PREFIX: &str = "vellum";

impl MetricsSnapshot {
    /// Pretty JSON, the endpoint's default format.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let counters: [(&str, &str, u64); 14] = [
            ("documents_processed_total", "Documents indexed successfully", self.documents_processed),
            ("documents_failed_total", "Documents that ended in error", self.documents_failed),
            ("classification_success_total", "Successful remote classification calls", self.classification_success),
            ("classification_failure_total", "Failed remote classification calls", self.classification_failure),
            ("classification_skipped_total", "Documents not sent for classification", self.classification_skipped),
            ("cache_hits_total", "Classification cache hits", self.cache_hits),
            ("cache_misses_total", "Classification cache misses", self.cache_misses),
            ("cache_errors_total", "Classification cache errors", self.cache_errors),
            ("routes_total", "Chunk routing decisions", self.routes_total),
            ("fallback_routes_total", "Routing decisions that used the fallback strategy", self.fallback_routes),
            ("chunks_indexed_total", "Chunks persisted with embeddings", self.chunks_indexed),
            ("index_failures_total", "Index operations that failed", self.index_failures),
            ("lock_skips_total", "Documents skipped because another process held the lock", self.lock_skips),
            ("auth_failures_total", "Authentication failures against the remote service", self.auth_failures),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {PREFIX}_{name} {help}");
            let _ = writeln!(out, "# TYPE {PREFIX}_{name} counter");
            let _ = writeln!(out, "{PREFIX}_{name} {value}");
        }

        let gauges: [(&str, &str, f64); 3] = [
            ("cache_hit_rate", "Fraction of classifications served from cache", self.cache_hit_rate),
            ("fallback_ratio", "Fraction of routing decisions that fell back", self.fallback_ratio),
            ("classification_failure_ratio", "Fraction of classification calls that failed", self.classification_failure_ratio),
        ];
        for (name, help, value) in gauges {
            let _ = writeln!(out, "# HELP {PREFIX}_{name} {help}");
            let _ = writeln!(out, "# TYPE {PREFIX}_{name} gauge");
            let _ = writeln!(out, "{PREFIX}_{name} {value}");
        }

        let latency = &self.classification_latency;
        let name = format!("{PREFIX}_classification_latency_seconds");
        let _ = writeln!(out, "# HELP {name} Remote classification call latency");
        let _ = writeln!(out, "# TYPE {name} summary");
        for (quantile, ms) in [("0.5", latency.p50_ms), ("0.95", latency.p95_ms), ("0.99", latency.p99_ms)] {
            let _ = writeln!(out, "{name}{{quantile=\"{quantile}\"}} {}", ms / 1000.0);
        }
        let _ = writeln!(out, "{name}_count {}", latency.count);

        let name = format!("{PREFIX}_strategy_usage_total");
        let _ = writeln!(out, "# HELP {name} Chunking strategy selections");
        let _ = writeln!(out, "# TYPE {name} counter");
        for (strategy, count) in &self.strategy_usage {
            let _ = writeln!(out, "{name}{{strategy=\"{strategy}\"}} {count}");
        }

        out
    }
}
