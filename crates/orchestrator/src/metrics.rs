//! Per-operation call counters and timings.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

struct Counters {
    total: AtomicU64,
    success: AtomicU64,
    total_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
        }
    }
}

/// Aggregated statistics for one operation. Durations are in seconds.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OperationStats {
    pub total_calls: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub avg_execution_time: f64,
    pub min_execution_time: f64,
    pub max_execution_time: f64,
}

#[derive(Clone, Default)]
pub struct PerformanceMonitor {
    operations: Arc<DashMap<String, Arc<Counters>>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: &str, duration: Duration, success: bool) {
        let existing = self
            .operations
            .get(operation)
            .map(|entry| Arc::clone(entry.value()));
        let counters = match existing {
            Some(counters) => counters,
            None => Arc::clone(
                self.operations
                    .entry(operation.to_string())
                    .or_insert_with(|| Arc::new(Counters::new()))
                    .value(),
            ),
        };

        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        counters.total.fetch_add(1, Ordering::Relaxed);
        if success {
            counters.success.fetch_add(1, Ordering::Relaxed);
        }
        counters.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        counters.min_nanos.fetch_min(nanos, Ordering::Relaxed);
        counters.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    pub fn stats(&self) -> BTreeMap<String, OperationStats> {
        self.operations
            .iter()
            .map(|entry| (entry.key().clone(), snapshot(entry.value())))
            .collect()
    }

    pub fn stats_for(&self, operation: &str) -> Option<OperationStats> {
        self.operations
            .get(operation)
            .map(|entry| snapshot(entry.value()))
    }
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("operations", &self.operations.len())
            .finish()
    }
}

fn snapshot(counters: &Counters) -> OperationStats {
    let total = counters.total.load(Ordering::Relaxed);
    let success = counters.success.load(Ordering::Relaxed).min(total);
    let total_secs = nanos_to_secs(counters.total_nanos.load(Ordering::Relaxed));
    let min_nanos = counters.min_nanos.load(Ordering::Relaxed);

    let (success_rate, avg) = if total == 0 {
        (0.0, 0.0)
    } else {
        (success as f64 / total as f64, total_secs / total as f64)
    };

    OperationStats {
        total_calls: total,
        success_count: success,
        error_count: total - success,
        success_rate,
        avg_execution_time: avg,
        min_execution_time: if min_nanos == u64::MAX {
            0.0
        } else {
            nanos_to_secs(min_nanos)
        },
        max_execution_time: nanos_to_secs(counters.max_nanos.load(Ordering::Relaxed)),
    }
}

fn nanos_to_secs(nanos: u64) -> f64 {
    Duration::from_nanos(nanos).as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_and_mean() {
        let monitor = PerformanceMonitor::new();
        monitor.record("step_execution", Duration::from_millis(100), true);
        monitor.record("step_execution", Duration::from_millis(300), true);
        monitor.record("step_execution", Duration::from_millis(200), false);
        monitor.record("step_execution", Duration::from_millis(400), true);

        let stats = monitor.stats_for("step_execution").unwrap();
        assert_eq!(stats.total_calls, 4);
        assert_eq!(stats.success_count, 3);
        assert_eq!(stats.error_count, 1);
        assert!((stats.success_rate - 0.75).abs() < 1e-9);
        assert!((stats.avg_execution_time - 0.25).abs() < 1e-9);
        assert!((stats.min_execution_time - 0.1).abs() < 1e-9);
        assert!((stats.max_execution_time - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_operation() {
        let monitor = PerformanceMonitor::new();
        assert!(monitor.stats_for("nothing").is_none());
        assert!(monitor.stats().is_empty());
    }

    #[test]
    fn test_stats_are_keyed_by_operation() {
        let monitor = PerformanceMonitor::new();
        monitor.record("b", Duration::from_millis(1), true);
        monitor.record("a", Duration::from_millis(1), false);

        let stats = monitor.stats();
        let keys: Vec<_> = stats.keys().cloned().collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(stats["a"].success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_concurrent_records() {
        let monitor = PerformanceMonitor::new();
        let mut handles = Vec::new();
        for i in 0..8 {
            let monitor = monitor.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    monitor.record("shared", Duration::from_millis(1), i % 2 == 0);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = monitor.stats_for("shared").unwrap();
        assert_eq!(stats.total_calls, 800);
        assert_eq!(stats.success_count, 400);
    }
}
