//! Integration tests for the resource-aware task scheduler

mod common;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use substrate_core::config::SchedulerConfig;
use substrate_core::events::EventPublisher;
use substrate_core::fault::{FaultBoundary, FaultCategory, FaultSeverity};
use substrate_core::scheduler::{TaskOptions, TaskPriority, TaskScheduler, TaskStatus};
use substrate_core::telemetry::{ChannelMemoryTelemetry, MemoryPressureListener, MemoryPressureMonitor, MemorySignal};

fn scheduler_config(max_concurrent_tasks: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent_tasks,
        retry_base_delay_ms: 50,
        default_timeout_ms: 5_000,
        ..Default::default()
    }
}

/// Record `(task_id, attempt)` for every attempt of `id`
fn queue_recorded(
    scheduler: &TaskScheduler,
    log: &Arc<Mutex<Vec<(String, u32)>>>,
    id: &str,
    fail_first_attempt: bool,
    options: TaskOptions,
) {
    let log = Arc::clone(log);
    scheduler
        .queue_task(
            id,
            move |ctx| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().push((ctx.task_id.clone(), ctx.attempt));
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    if fail_first_attempt && ctx.attempt == 1 {
                        anyhow::bail!("transient failure");
                    }
                    Ok(())
                }
            },
            options,
        )
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_retry_jumps_ahead_of_same_priority_work() {
    let scheduler = TaskScheduler::new(scheduler_config(1));
    let log = Arc::new(Mutex::new(Vec::new()));

    queue_recorded(&scheduler, &log, "1", true, TaskOptions::default().with_retry_attempts(1));
    queue_recorded(&scheduler, &log, "2", false, TaskOptions::default());
    queue_recorded(&scheduler, &log, "3", false, TaskOptions::default());

    scheduler.start();
    scheduler.wait_until_idle().await;

    let expected: Vec<(String, u32)> = vec![
        ("1".into(), 1),
        ("1".into(), 2),
        ("2".into(), 1),
        ("3".into(), 1),
    ];
    assert_eq!(*log.lock(), expected);

    let metrics = scheduler.metrics();
    assert_eq!(metrics.tasks_completed, 3);
    assert_eq!(metrics.tasks_retried, 1);
    assert_eq!(metrics.tasks_failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_ceiling_is_never_exceeded() {
    let scheduler = TaskScheduler::new(scheduler_config(3));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for index in 0..20 {
        let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
        let priority = TaskPriority::from_ordinal((index % 5) as u8).unwrap();
        scheduler
            .queue_task(
                format!("task-{index}"),
                move |_| {
                    let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(25)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                TaskOptions::default().with_priority(priority),
            )
            .unwrap();
    }

    scheduler.start();
    assert_eq!(scheduler.status().active_tasks, 3);
    scheduler.wait_until_idle().await;

    assert_eq!(peak.load(Ordering::SeqCst), 3);
    assert_eq!(scheduler.metrics().tasks_completed, 20);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_reaches_fault_boundary() {
    let boundary = Arc::new(FaultBoundary::new(Default::default()));
    boundary.activate();
    let events = EventPublisher::new(64);
    let mut receiver = events.subscribe();
    let scheduler = TaskScheduler::with_integrations(
        scheduler_config(1),
        Some(Arc::clone(&boundary)),
        Some(events),
    );

    scheduler
        .queue_task(
            "doomed",
            |_| async { anyhow::bail!("upstream rejected the payload") },
            TaskOptions::default().with_retry_attempts(2),
        )
        .unwrap();
    scheduler.start();
    scheduler.wait_until_idle().await;
    // Let the fault capture that follows the slot release finish
    tokio::time::sleep(Duration::from_millis(1)).await;

    let mut names = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        names.push(event.name());
    }
    assert_eq!(
        names.iter().filter(|name| **name == "task.started").count(),
        3,
        "events: {names:?}"
    );
    assert_eq!(names.iter().filter(|name| **name == "task.retrying").count(), 2);
    assert!(names.contains(&"task.failed"));

    let stats = boundary.error_stats(5);
    assert_eq!(stats.count(FaultSeverity::Critical), 1);
    assert_eq!(stats.recent[0].category, FaultCategory::Task);
}

#[tokio::test(start_paused = true)]
async fn test_suspend_holds_queue_until_resume() {
    let scheduler = TaskScheduler::new(scheduler_config(2));
    scheduler.start();
    scheduler.suspend();

    scheduler
        .queue_task("held", |_| async { Ok(()) }, TaskOptions::default())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(scheduler.task_status("held").unwrap().status, TaskStatus::Queued);

    scheduler.resume();
    scheduler.wait_until_idle().await;
    assert!(scheduler.task_status("held").is_none());
    assert_eq!(scheduler.metrics().tasks_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_memory_pressure_signals_pause_dispatch() {
    let telemetry = Arc::new(ChannelMemoryTelemetry::default());
    let monitor = Arc::new(MemoryPressureMonitor::new(telemetry.clone()));
    let scheduler = TaskScheduler::new(scheduler_config(2));
    scheduler.start();

    let listener: Arc<dyn MemoryPressureListener> = Arc::new(scheduler.clone());
    let signals = monitor.subscribe();
    let loop_monitor = Arc::clone(&monitor);
    let handle = tokio::spawn(async move { loop_monitor.run(signals, listener).await });

    telemetry.publish(MemorySignal::Critical);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(scheduler.status().memory_pressure);

    scheduler
        .queue_task("deferred", |_| async { Ok(()) }, TaskOptions::default())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(scheduler.status().queued_tasks, 1);

    telemetry.publish(MemorySignal::Normal);
    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.wait_until_idle().await;
    assert_eq!(scheduler.metrics().tasks_completed, 1);

    monitor.stop();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_running_task_cannot_be_cancelled() {
    let scheduler = TaskScheduler::new(scheduler_config(1));
    scheduler
        .queue_task(
            "long",
            |_| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            },
            TaskOptions::default(),
        )
        .unwrap();
    scheduler
        .queue_task("behind", |_| async { Ok(()) }, TaskOptions::default())
        .unwrap();
    scheduler.start();

    assert!(!scheduler.cancel_task("long"));
    assert!(scheduler.cancel_task("behind"));

    scheduler.wait_until_idle().await;
    let metrics = scheduler.metrics();
    assert_eq!(metrics.tasks_completed, 1);
    assert_eq!(metrics.tasks_cancelled, 1);
}
