//! Bounded exponential backoff for remote calls.

use crate::error::{OllamaError, OllamaResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use vellum_config::RetryConfig;

/// Retry settings applied to classification and embedding calls alike.
///
/// Retry `n` (0-based) waits `base_delay * multiplier^n`, capped at
/// `max_delay`, then spread by `±jitter`. A rate-limit response carrying a
/// server delay waits that long instead, still capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier.max(1.0),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Un-jittered wait before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(64) as i32);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.round() as u64)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64((1.0 + spread).max(0.0))
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// Non-retryable errors (authentication, bad request, parse) return
    /// immediately. When retries are exhausted the last error is wrapped in
    /// [`OllamaError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> OllamaResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = OllamaResult<T>>,
    {
        let mut retry = 0u32;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if retry >= self.max_retries {
                if self.max_retries == 0 {
                    return Err(err);
                }
                warn!(operation, attempts = retry + 1, error = %err, "Retries exhausted");
                return Err(OllamaError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: retry + 1,
                    source: Box::new(err),
                });
            }

            let delay = match err.retry_after() {
                Some(server_delay) => server_delay.min(self.max_delay),
                None => self.jittered(self.delay_for(retry)),
            };
            warn!(
                operation,
                attempt = retry + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}
