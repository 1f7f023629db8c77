//! # Task Scheduler
//!
//! Priority-ordered execution of background work with a concurrency cap,
//! per-task timeouts, retry with exponential backoff and memory-aware
//! admission control.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use substrate_core::config::SchedulerConfig;
//! use substrate_core::scheduler::{TaskOptions, TaskPriority, TaskScheduler};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = TaskScheduler::new(SchedulerConfig::default());
//! scheduler.start();
//!
//! scheduler.queue_task(
//!     "rebuild-index",
//!     |ctx| async move {
//!         tracing::info!(attempt = ctx.attempt, "rebuilding");
//!         Ok(())
//!     },
//!     TaskOptions::default().with_priority(TaskPriority::High),
//! )?;
//!
//! scheduler.wait_until_idle().await;
//! # Ok(())
//! # }
//! ```

pub mod metrics;
pub mod queue;
pub mod task;
pub mod task_scheduler;

pub use metrics::{SchedulerMetrics, SchedulerStatus};
pub use queue::PriorityQueue;
pub use task::{task_work, TaskContext, TaskInfo, TaskOptions, TaskPriority, TaskStatus, TaskWork};
pub use task_scheduler::TaskScheduler;

use thiserror::Error;

/// Reasons a submission is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),
    #[error("Task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },
    #[error("Scheduler is shutting down and no longer accepts tasks")]
    NotAccepting,
}
