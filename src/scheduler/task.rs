use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Dispatch priority; lower ordinal drains first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
    Idle = 4,
}

impl TaskPriority {
    /// All priorities, most urgent first
    pub const ALL: [TaskPriority; 5] = [
        TaskPriority::Critical,
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Low,
        TaskPriority::Idle,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Critical => write!(f, "critical"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Normal => write!(f, "normal"),
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Idle => write!(f, "idle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    /// Executing, or holding its slot while waiting out a retry backoff
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Re-invocable work routine; each attempt gets a fresh context
pub type TaskWork = Arc<dyn Fn(TaskContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as [`TaskWork`]
pub fn task_work<F, Fut>(work: F) -> TaskWork
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |context| work(context).boxed())
}

/// Per-attempt view handed to the work routine
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: String,
    /// 1-based attempt number
    pub attempt: u32,
    pub metadata: serde_json::Value,
    cancellation: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(task_id: String, attempt: u32, metadata: serde_json::Value, cancellation: CancellationToken) -> Self {
        Self {
            task_id,
            attempt,
            metadata,
            cancellation,
        }
    }

    /// Cancelled on timeout or forced shutdown
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Submission options; unset fields fall back to scheduler configuration
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub priority: TaskPriority,
    pub timeout: Option<Duration>,
    pub retry_attempts: Option<u32>,
    /// Declared memory ceiling reserved while the task holds a slot
    pub max_memory_bytes: Option<u64>,
    pub metadata: serde_json::Value,
}

impl TaskOptions {
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = Some(retry_attempts);
        self
    }

    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Registered task
pub(crate) struct TaskEntry {
    pub id: String,
    pub work: TaskWork,
    pub priority: TaskPriority,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub memory_reservation: u64,
    pub metadata: serde_json::Value,
    pub status: TaskStatus,
    pub attempts: u32,
    pub queued_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}

impl TaskEntry {
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id.clone(),
            priority: self.priority,
            status: self.status,
            attempts: self.attempts,
            max_attempts: self.retry_attempts + 1,
            timeout_ms: self.timeout.as_millis() as u64,
            memory_reservation_bytes: self.memory_reservation,
            metadata: self.metadata.clone(),
            queued_at: self.queued_at,
            started_at: self.started_at,
            last_error: self.last_error.clone(),
        }
    }
}

/// Introspection view of a live task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub memory_reservation_bytes: u64,
    pub metadata: serde_json::Value,
    pub queued_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}
