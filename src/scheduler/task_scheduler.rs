//! # Resource-Aware Task Scheduler
//!
//! Runs opaque units of work with bounded concurrency, strict priority
//! ordering and automatic retry.
//!
//! All queue, registry and admission state lives behind one lock. Every state
//! change ends with a dispatch pass ("pump") that starts as many queued tasks
//! as admission control allows, so there is no polling loop. A failed attempt
//! keeps its slot while it waits out its backoff and is then reinserted at the
//! front of its bucket.

use super::metrics::{DurationWindow, SchedulerMetrics, SchedulerStatus};
use super::queue::PriorityQueue;
use super::task::{task_work, TaskContext, TaskEntry, TaskInfo, TaskOptions, TaskPriority, TaskStatus, TaskWork};
use super::SchedulerError;
use crate::config::SchedulerConfig;
use crate::events::{EventPublisher, SubstrateEvent};
use crate::fault::classification::panic_message;
use crate::fault::{Fault, FaultBoundary, FaultCategory, FaultKind, FaultOrigin};
use crate::resilience::exponential_delay;
use crate::telemetry::MemoryPressureListener;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything needed to run one attempt outside the lock
struct Launch {
    id: String,
    attempt: u32,
    work: TaskWork,
    timeout: Duration,
    metadata: serde_json::Value,
    token: CancellationToken,
}

enum AttemptFailure {
    Error(anyhow::Error),
    Panic(String),
    TimedOut(Duration),
}

impl AttemptFailure {
    fn message(&self) -> String {
        match self {
            AttemptFailure::Error(err) => format!("{err:#}"),
            AttemptFailure::Panic(message) => format!("panicked: {message}"),
            AttemptFailure::TimedOut(limit) => format!("timed out after {limit:?}"),
        }
    }

    fn into_fault(self, task_id: &str) -> Fault {
        match self {
            AttemptFailure::Error(err) => {
                Fault::from_anyhow(FaultCategory::Task, &err.context(format!("task '{task_id}'")))
            }
            AttemptFailure::Panic(message) => Fault::new(
                FaultCategory::Task,
                FaultKind::Internal,
                format!("task '{task_id}' panicked: {message}"),
            ),
            AttemptFailure::TimedOut(limit) => Fault::new(
                FaultCategory::Task,
                FaultKind::Timeout,
                format!("task '{task_id}' timed out after {limit:?}"),
            ),
        }
    }
}

enum AttemptOutcome {
    Succeeded,
    Failed(AttemptFailure),
    Cancelled,
}

enum FailureDecision {
    Retry { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

#[derive(Default)]
struct SchedulerState {
    queue: PriorityQueue,
    tasks: HashMap<String, TaskEntry>,
    /// Tasks holding a concurrency slot
    active: HashSet<String>,
    running: bool,
    accepting: bool,
    suspended: bool,
    memory_pressure: bool,
    reserved_memory: u64,
    metrics: SchedulerMetrics,
    durations: DurationWindow,
}

impl SchedulerState {
    fn can_dispatch(&self, config: &SchedulerConfig) -> bool {
        self.running
            && !self.suspended
            && !self.memory_pressure
            && self.active.len() < config.max_concurrent_tasks
    }

    /// Admit the head of the most urgent bucket, if it fits
    fn next_launch(&mut self, config: &SchedulerConfig, shutdown: &CancellationToken) -> Option<Launch> {
        if !self.can_dispatch(config) {
            return None;
        }

        let (_, head) = self.queue.peek()?;
        let reservation = self.tasks.get(head).map(|entry| entry.memory_reservation).unwrap_or(0);
        if !self.active.is_empty() && self.reserved_memory + reservation > config.max_total_memory_bytes {
            // The head waits for memory; lower priorities must not overtake it
            return None;
        }

        let (_, id) = self.queue.pop()?;
        let entry = self.tasks.get_mut(&id)?;
        entry.status = TaskStatus::Running;
        entry.attempts += 1;
        entry.started_at = Some(chrono::Utc::now());

        self.active.insert(id.clone());
        self.reserved_memory += entry.memory_reservation;
        self.metrics.tasks_started += 1;

        Some(Launch {
            id,
            attempt: entry.attempts,
            work: Arc::clone(&entry.work),
            timeout: entry.timeout,
            metadata: entry.metadata.clone(),
            token: shutdown.child_token(),
        })
    }

    /// Drop a task from every registry and give back its slot
    fn release(&mut self, id: &str) -> Option<TaskEntry> {
        let entry = self.tasks.remove(id)?;
        if self.active.remove(id) {
            self.reserved_memory = self.reserved_memory.saturating_sub(entry.memory_reservation);
        }
        Some(entry)
    }

    fn record_failure(&mut self, id: &str, message: &str, base_delay: Duration) -> Option<FailureDecision> {
        let entry = self.tasks.get_mut(id)?;
        entry.last_error = Some(message.to_string());

        if entry.attempts <= entry.retry_attempts {
            let attempt = entry.attempts;
            self.metrics.tasks_retried += 1;
            return Some(FailureDecision::Retry {
                attempt,
                delay: exponential_delay(base_delay, attempt),
            });
        }

        let attempts = entry.attempts;
        self.release(id);
        self.metrics.tasks_failed += 1;
        Some(FailureDecision::Exhausted { attempts })
    }

    fn status(&self, config: &SchedulerConfig) -> SchedulerStatus {
        SchedulerStatus {
            running: self.running,
            accepting: self.accepting,
            suspended: self.suspended,
            memory_pressure: self.memory_pressure,
            active_tasks: self.active.len(),
            queued_tasks: self.queue.len(),
            queue_depths: self.queue.depths(),
            max_concurrent_tasks: config.max_concurrent_tasks,
            reserved_memory_bytes: self.reserved_memory,
        }
    }
}

struct SchedulerInner {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    boundary: Option<Arc<FaultBoundary>>,
    events: Option<EventPublisher>,
    /// Parent of every attempt token; cancelled on forced shutdown
    shutdown_token: CancellationToken,
    /// Signalled whenever a slot is released
    slot_released: Notify,
}

impl SchedulerInner {
    fn publish(&self, event: SubstrateEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

/// Priority task scheduler with concurrency and memory admission control
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("status", &self.status())
            .finish()
    }
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_integrations(config, None, None)
    }

    /// Scheduler reporting terminal failures to `boundary` and lifecycle
    /// notifications to `events`
    pub fn with_integrations(
        config: SchedulerConfig,
        boundary: Option<Arc<FaultBoundary>>,
        events: Option<EventPublisher>,
    ) -> Self {
        let state = SchedulerState {
            accepting: true,
            ..Default::default()
        };
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                state: Mutex::new(state),
                boundary,
                events,
                shutdown_token: CancellationToken::new(),
                slot_released: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Enable dispatching; tasks queued earlier start now
    pub fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.running || !state.accepting {
                return;
            }
            state.running = true;
        }
        info!(
            max_concurrent_tasks = self.inner.config.max_concurrent_tasks,
            max_queue_size = self.inner.config.max_queue_size,
            "🚀 SCHEDULER: Started"
        );
        Self::pump(&self.inner);
    }

    /// Submit a unit of work.
    ///
    /// Rejected when the id is already registered, the queue is at capacity
    /// or the scheduler is shutting down.
    pub fn queue_task<F, Fut>(&self, id: impl Into<String>, work: F, options: TaskOptions) -> Result<(), SchedulerError>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.queue_work(id, task_work(work), options)
    }

    /// Submit pre-wrapped [`TaskWork`]
    pub fn queue_work(&self, id: impl Into<String>, work: TaskWork, options: TaskOptions) -> Result<(), SchedulerError> {
        let id = id.into();
        let config = &self.inner.config;

        {
            let mut state = self.inner.state.lock();
            if !state.accepting {
                state.metrics.tasks_rejected += 1;
                return Err(SchedulerError::NotAccepting);
            }
            if state.tasks.contains_key(&id) {
                state.metrics.tasks_rejected += 1;
                return Err(SchedulerError::DuplicateTask(id));
            }
            if state.queue.len() >= config.max_queue_size {
                state.metrics.tasks_rejected += 1;
                warn!(task_id = %id, capacity = config.max_queue_size, "⚠️ SCHEDULER: Queue full");
                return Err(SchedulerError::QueueFull {
                    capacity: config.max_queue_size,
                });
            }

            let entry = TaskEntry {
                id: id.clone(),
                work,
                priority: options.priority,
                timeout: options.timeout.unwrap_or_else(|| config.default_timeout()),
                retry_attempts: options.retry_attempts.unwrap_or(config.default_retry_attempts),
                memory_reservation: options
                    .max_memory_bytes
                    .map(|bytes| bytes.min(config.max_task_memory_bytes))
                    .unwrap_or(0),
                metadata: options.metadata,
                status: TaskStatus::Queued,
                attempts: 0,
                queued_at: chrono::Utc::now(),
                started_at: None,
                last_error: None,
            };

            state.queue.push_back(options.priority, id.clone());
            state.tasks.insert(id.clone(), entry);
            state.metrics.tasks_queued += 1;
        }

        debug!(task_id = %id, priority = %options.priority, "Task queued");
        self.inner.publish(SubstrateEvent::TaskQueued { task_id: id });
        Self::pump(&self.inner);
        Ok(())
    }

    /// Cancel a task that has not been dequeued yet
    pub fn cancel_task(&self, id: &str) -> bool {
        {
            let mut state = self.inner.state.lock();
            let priority = match state.tasks.get(id) {
                Some(entry) if entry.status == TaskStatus::Queued => entry.priority,
                _ => return false,
            };
            state.queue.remove(priority, id);
            state.release(id);
            state.metrics.tasks_cancelled += 1;
        }

        info!(task_id = %id, "🚫 SCHEDULER: Task cancelled");
        self.inner.publish(SubstrateEvent::TaskCancelled {
            task_id: id.to_string(),
        });
        true
    }

    /// Halt new dequeues; running tasks are unaffected
    pub fn suspend(&self) {
        self.inner.state.lock().suspended = true;
        info!("⏸️ SCHEDULER: Suspended");
    }

    pub fn resume(&self) {
        self.inner.state.lock().suspended = false;
        info!("▶️ SCHEDULER: Resumed");
        Self::pump(&self.inner);
    }

    pub fn handle_memory_pressure(&self) {
        let changed = !std::mem::replace(&mut self.inner.state.lock().memory_pressure, true);
        if changed {
            warn!("🚨 SCHEDULER: Dispatch halted under memory pressure");
        }
    }

    pub fn clear_memory_pressure(&self) {
        let changed = std::mem::replace(&mut self.inner.state.lock().memory_pressure, false);
        if changed {
            info!("✅ SCHEDULER: Memory pressure cleared, dispatch resumed");
            Self::pump(&self.inner);
        }
    }

    pub fn task_status(&self, id: &str) -> Option<TaskInfo> {
        self.inner.state.lock().tasks.get(id).map(TaskEntry::info)
    }

    pub fn status(&self) -> SchedulerStatus {
        self.inner.state.lock().status(&self.inner.config)
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        let state = self.inner.state.lock();
        let mut metrics = state.metrics.clone();
        metrics.average_duration_ms = state.durations.average_ms();
        metrics.duration_samples = state.durations.len();
        metrics
    }

    /// Wait until nothing is queued or holding a slot
    pub async fn wait_until_idle(&self) {
        loop {
            let released = self.inner.slot_released.notified();
            {
                let state = self.inner.state.lock();
                let blocked = state.suspended || state.memory_pressure || !state.running;
                if state.active.is_empty() && (state.queue.is_empty() || blocked) {
                    return;
                }
            }
            released.await;
        }
    }

    /// Stop accepting work, cancel queued tasks, give running tasks `grace`
    /// to finish and then cancel the stragglers
    pub async fn shutdown(&self, grace: Duration) {
        let cancelled = {
            let mut state = self.inner.state.lock();
            if !state.accepting {
                return;
            }
            state.accepting = false;
            state.running = false;

            let drained = state.queue.drain();
            for id in &drained {
                state.release(id);
            }
            state.metrics.tasks_cancelled += drained.len() as u64;
            drained
        };

        info!(
            cancelled_queued = cancelled.len(),
            grace_ms = grace.as_millis() as u64,
            "🛑 SCHEDULER: Shutting down"
        );
        for task_id in cancelled {
            self.inner.publish(SubstrateEvent::TaskCancelled { task_id });
        }

        let deadline = Instant::now() + grace;
        if !self.wait_for_slots(Some(deadline)).await {
            warn!(
                active = self.inner.state.lock().active.len(),
                "⚠️ SCHEDULER: Grace period elapsed, cancelling running tasks"
            );
            self.inner.shutdown_token.cancel();
            self.wait_for_slots(None).await;
        }
        info!("🛑 SCHEDULER: Shut down");
    }

    /// True when every slot was released before the deadline
    async fn wait_for_slots(&self, deadline: Option<Instant>) -> bool {
        loop {
            let released = self.inner.slot_released.notified();
            if self.inner.state.lock().active.is_empty() {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, released).await.is_err() {
                        return self.inner.state.lock().active.is_empty();
                    }
                }
                None => released.await,
            }
        }
    }

    fn pump(inner: &Arc<SchedulerInner>) {
        let launches: Vec<Launch> = {
            let mut state = inner.state.lock();
            std::iter::from_fn(|| state.next_launch(&inner.config, &inner.shutdown_token)).collect()
        };

        for launch in launches {
            debug!(task_id = %launch.id, attempt = launch.attempt, "Task dispatched");
            inner.publish(SubstrateEvent::TaskStarted {
                task_id: launch.id.clone(),
                attempt: launch.attempt,
            });
            tokio::spawn(Self::run_attempt(Arc::clone(inner), launch));
        }
    }

    async fn run_attempt(inner: Arc<SchedulerInner>, launch: Launch) {
        let context = TaskContext::new(
            launch.id.clone(),
            launch.attempt,
            launch.metadata.clone(),
            launch.token.clone(),
        );
        let routine = Arc::clone(&launch.work);
        let work = AssertUnwindSafe(async move { routine(context).await }).catch_unwind();
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = launch.token.cancelled() => AttemptOutcome::Cancelled,
            result = timeout(launch.timeout, work) => match result {
                Ok(Ok(Ok(()))) => AttemptOutcome::Succeeded,
                Ok(Ok(Err(err))) => AttemptOutcome::Failed(AttemptFailure::Error(err)),
                Ok(Err(payload)) => AttemptOutcome::Failed(AttemptFailure::Panic(panic_message(payload.as_ref()))),
                Err(_) => {
                    launch.token.cancel();
                    AttemptOutcome::Failed(AttemptFailure::TimedOut(launch.timeout))
                }
            },
        };
        let elapsed = started.elapsed();

        match outcome {
            AttemptOutcome::Succeeded => Self::complete(&inner, &launch, elapsed),
            AttemptOutcome::Cancelled => Self::cancel_running(&inner, &launch.id),
            AttemptOutcome::Failed(failure) => Self::fail(&inner, &launch, failure).await,
        }
    }

    fn complete(inner: &Arc<SchedulerInner>, launch: &Launch, elapsed: Duration) {
        {
            let mut state = inner.state.lock();
            state.release(&launch.id);
            state.metrics.tasks_completed += 1;
            state.durations.record(elapsed);
        }
        inner.slot_released.notify_waiters();

        info!(
            task_id = %launch.id,
            attempt = launch.attempt,
            duration_ms = elapsed.as_millis() as u64,
            "✅ SCHEDULER: Task completed"
        );
        inner.publish(SubstrateEvent::TaskCompleted {
            task_id: launch.id.clone(),
            duration_ms: elapsed.as_millis() as u64,
        });
        Self::pump(inner);
    }

    fn cancel_running(inner: &Arc<SchedulerInner>, id: &str) {
        let released = {
            let mut state = inner.state.lock();
            let released = state.release(id).is_some();
            if released {
                state.metrics.tasks_cancelled += 1;
            }
            released
        };
        inner.slot_released.notify_waiters();

        if released {
            warn!(task_id = %id, "🚫 SCHEDULER: Running task cancelled by shutdown");
            inner.publish(SubstrateEvent::TaskCancelled {
                task_id: id.to_string(),
            });
        }
    }

    async fn fail(inner: &Arc<SchedulerInner>, launch: &Launch, failure: AttemptFailure) {
        let message = failure.message();
        let decision = {
            let mut state = inner.state.lock();
            if matches!(failure, AttemptFailure::TimedOut(_)) {
                state.metrics.tasks_timed_out += 1;
            }
            state.record_failure(&launch.id, &message, inner.config.retry_base_delay())
        };

        match decision {
            Some(FailureDecision::Retry { attempt, delay }) => {
                warn!(
                    task_id = %launch.id,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "🔄 SCHEDULER: Task attempt failed, retrying"
                );
                inner.publish(SubstrateEvent::TaskRetrying {
                    task_id: launch.id.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    error: message,
                });

                let interrupted = tokio::select! {
                    biased;
                    _ = inner.shutdown_token.cancelled() => true,
                    _ = sleep(delay) => false,
                };
                Self::requeue(inner, &launch.id, interrupted);
            }
            Some(FailureDecision::Exhausted { attempts }) => {
                inner.slot_released.notify_waiters();
                error!(
                    task_id = %launch.id,
                    attempts = attempts,
                    error = %message,
                    "❌ SCHEDULER: Task failed permanently"
                );
                inner.publish(SubstrateEvent::TaskFailed {
                    task_id: launch.id.clone(),
                    attempts,
                    error: message,
                });
                Self::pump(inner);

                if let Some(boundary) = &inner.boundary {
                    boundary
                        .capture(failure.into_fault(&launch.id), FaultOrigin::Background)
                        .await;
                }
            }
            None => {}
        }
    }

    /// Return a retrying task to the front of its bucket after its backoff
    fn requeue(inner: &Arc<SchedulerInner>, id: &str, interrupted: bool) {
        let requeued = {
            let mut state = inner.state.lock();
            if interrupted || !state.accepting {
                if state.release(id).is_some() {
                    state.metrics.tasks_cancelled += 1;
                }
                false
            } else if let Some(entry) = state.tasks.get_mut(id) {
                entry.status = TaskStatus::Queued;
                let priority = entry.priority;
                let reservation = entry.memory_reservation;
                state.active.remove(id);
                state.reserved_memory = state.reserved_memory.saturating_sub(reservation);
                state.queue.push_front(priority, id.to_string());
                true
            } else {
                false
            }
        };
        inner.slot_released.notify_waiters();

        if requeued {
            Self::pump(inner);
        } else {
            inner.publish(SubstrateEvent::TaskCancelled {
                task_id: id.to_string(),
            });
        }
    }
}

impl MemoryPressureListener for TaskScheduler {
    fn on_memory_pressure(&self) {
        self.handle_memory_pressure();
    }

    fn on_memory_pressure_cleared(&self) {
        self.clear_memory_pressure();
    }
}
