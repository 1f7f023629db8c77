use super::task::TaskPriority;
use crate::constants::system::ROLLING_WINDOW;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Cumulative scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    pub tasks_queued: u64,
    /// Attempts dispatched, retries included
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub tasks_cancelled: u64,
    pub tasks_rejected: u64,
    pub tasks_timed_out: u64,
    /// Mean duration of the most recent successful attempts
    pub average_duration_ms: f64,
    pub duration_samples: usize,
}

/// Queue and admission state at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub accepting: bool,
    pub suspended: bool,
    pub memory_pressure: bool,
    pub active_tasks: usize,
    pub queued_tasks: usize,
    pub queue_depths: BTreeMap<TaskPriority, usize>,
    pub max_concurrent_tasks: usize,
    pub reserved_memory_bytes: u64,
}

/// Fixed-size window of recent durations
#[derive(Debug, Default)]
pub(crate) struct DurationWindow {
    samples: VecDeque<Duration>,
}

impl DurationWindow {
    pub fn record(&mut self, duration: Duration) {
        self.samples.push_back(duration);
        while self.samples.len() > ROLLING_WINDOW {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn average_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: Duration = self.samples.iter().sum();
        total.as_secs_f64() * 1_000.0 / self.samples.len() as f64
    }
}
