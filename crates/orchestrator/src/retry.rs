//! Retry with backoff around fallible async calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use automation_core::ErrorClassifier;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ExecutionFailure;
use crate::metrics::PerformanceMonitor;

/// Portion of the computed delay that jitter may add on top.
const JITTER_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Fixed,
    Linear,
    #[default]
    Exponential,
    Fibonacci,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub strategy: RetryStrategy,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            strategy: RetryStrategy::Exponential,
            backoff_multiplier: 2.0,
            jitter: true,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based),
    /// capped at `max_delay`, without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let factor = match self.strategy {
            RetryStrategy::Fixed => 1.0,
            RetryStrategy::Linear => attempt as f64,
            RetryStrategy::Exponential => self
                .backoff_multiplier
                .powi(i32::try_from(attempt - 1).unwrap_or(i32::MAX)),
            RetryStrategy::Fibonacci => fibonacci(attempt),
        };

        let cap = self.max_delay.as_secs_f64();
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= cap {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    /// [`delay_for`](Self::delay_for) plus up to 10% random jitter when enabled.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter {
            delay + delay.mul_f64(fastrand::f64() * JITTER_FRACTION)
        } else {
            delay
        }
    }
}

/// 1, 2, 3, 5, 8, ... for attempts 1, 2, 3, 4, 5, ...
fn fibonacci(n: u32) -> f64 {
    let (mut prev, mut current) = (1.0_f64, 1.0_f64);
    // Past ~100 terms the value dwarfs any sensible max_delay.
    for _ in 0..n.min(100) {
        let next = prev + current;
        prev = current;
        current = next;
    }
    prev
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetryError {
    #[error("{0}")]
    Exhausted(ExecutionFailure),

    #[error("Cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

/// Runs operations under a [`RetryPolicy`], recording every attempt.
#[derive(Debug, Clone)]
pub struct RetryEngine {
    classifier: ErrorClassifier,
    monitor: PerformanceMonitor,
}

impl RetryEngine {
    pub fn new(monitor: PerformanceMonitor) -> Self {
        Self {
            classifier: ErrorClassifier::new(),
            monitor,
        }
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Call `operation(attempt)` until it succeeds, fails with a non-retryable
    /// category, runs out of attempts, or `cancel` fires.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation_name: &str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let started = Instant::now();
            let result = operation(attempt).await;
            let elapsed = started.elapsed();

            let message = match result {
                Ok(value) => {
                    self.monitor.record(operation_name, elapsed, true);
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    self.monitor.record(operation_name, elapsed, false);
                    e.to_string()
                }
            };

            let classification = self.classifier.classify(&message);
            if !classification.retryable || attempt >= max_attempts {
                warn!(
                    operation = operation_name,
                    attempt,
                    category = %classification.category,
                    retryable = classification.retryable,
                    error = %message,
                    "Giving up"
                );
                return Err(RetryError::Exhausted(ExecutionFailure {
                    category: classification.category,
                    message,
                    suggestion: classification.suggestion.to_string(),
                    attempts: attempt,
                }));
            }

            let delay = policy.jittered_delay(attempt);
            warn!(
                operation = operation_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                category = %classification.category,
                error = %message,
                "Attempt failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
