use crate::constants::system::ROLLING_WINDOW;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Running query counters with a rolling latency window
#[derive(Debug, Default)]
pub struct QueryMetrics {
    total: u64,
    successful: u64,
    failed: u64,
    rejected: u64,
    timeouts: u64,
    health_checks: u64,
    health_check_failures: u64,
    latencies: VecDeque<Duration>,
    last_error: Option<String>,
    last_health_check: Option<chrono::DateTime<chrono::Utc>>,
}

impl QueryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.total += 1;
        self.successful += 1;
        self.push_latency(latency);
    }

    pub fn record_failure(&mut self, latency: Duration, error: &super::DatastoreError) {
        self.total += 1;
        self.failed += 1;
        if error.is_timeout() {
            self.timeouts += 1;
        }
        self.last_error = Some(error.to_string());
        self.push_latency(latency);
    }

    /// Query refused by the open circuit
    pub fn record_rejection(&mut self) {
        self.total += 1;
        self.rejected += 1;
    }

    pub fn record_health_check(&mut self, healthy: bool) {
        self.health_checks += 1;
        if !healthy {
            self.health_check_failures += 1;
        }
        self.last_health_check = Some(chrono::Utc::now());
    }

    fn push_latency(&mut self, latency: Duration) {
        self.latencies.push_back(latency);
        while self.latencies.len() > ROLLING_WINDOW {
            self.latencies.pop_front();
        }
    }

    pub fn average_latency(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.latencies.iter().sum();
        sum / self.latencies.len() as u32
    }

    pub fn snapshot(&self) -> QueryStats {
        QueryStats {
            total: self.total,
            successful: self.successful,
            failed: self.failed,
            rejected: self.rejected,
            timeouts: self.timeouts,
            health_checks: self.health_checks,
            health_check_failures: self.health_check_failures,
            average_latency_ms: self.average_latency().as_secs_f64() * 1_000.0,
            samples: self.latencies.len(),
            last_error: self.last_error.clone(),
            last_health_check: self.last_health_check,
        }
    }
}

/// Serializable view of [`QueryMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub rejected: u64,
    pub timeouts: u64,
    pub health_checks: u64,
    pub health_check_failures: u64,
    /// Mean over the most recent executed queries
    pub average_latency_ms: f64,
    pub samples: usize,
    pub last_error: Option<String>,
    pub last_health_check: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatastoreError;

    #[test]
    fn test_rolling_average_uses_last_window() {
        let mut metrics = QueryMetrics::new();
        for _ in 0..ROLLING_WINDOW {
            metrics.record_success(Duration::from_millis(100));
        }
        for _ in 0..ROLLING_WINDOW {
            metrics.record_success(Duration::from_millis(10));
        }

        let stats = metrics.snapshot();
        assert_eq!(stats.total, 2 * ROLLING_WINDOW as u64);
        assert_eq!(stats.samples, ROLLING_WINDOW);
        assert!((stats.average_latency_ms - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_failures_and_rejections_are_counted() {
        let mut metrics = QueryMetrics::new();
        metrics.record_failure(
            Duration::from_millis(5),
            &DatastoreError::QueryTimeout(Duration::from_millis(5)),
        );
        metrics.record_rejection();
        metrics.record_health_check(false);

        let stats = metrics.snapshot();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.health_check_failures, 1);
        assert_eq!(stats.samples, 1);
        assert!(stats.last_error.unwrap().contains("timed out"));
    }
}
