//! Vellum Metrics - Counters and latency percentiles observed across the pipeline.
//!
//! A single [`MetricsCollector`] is created per process and shared as an
//! `Arc` by every stage. It can be reset in place, so tests never need
//! global state.

mod collector;
mod exposition;

pub use collector::{LatencySummary, MetricsCollector, MetricsSnapshot};
