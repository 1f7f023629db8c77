//! End-to-end lifecycle of the substrate root with an in-memory datastore

mod common;

use common::{test_config, MemoryDatastore, RecordingTerminator};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use substrate_core::constants::{services, system};
use substrate_core::fault::{FaultBoundary, ProcessTerminator};
use substrate_core::orchestration::{ServiceStatus, SubstrateCore};
use substrate_core::scheduler::TaskOptions;
use substrate_core::{FaultSeverity, SubstrateError};

fn build(store: &Arc<MemoryDatastore>, terminator: &Arc<RecordingTerminator>) -> Arc<SubstrateCore> {
    SubstrateCore::builder(test_config())
        .connector(store.connector())
        .terminator(Arc::clone(terminator) as Arc<dyn ProcessTerminator>)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_full_bootstrap_and_shutdown() {
    let store = MemoryDatastore::new();
    let terminator = RecordingTerminator::new();
    let core = build(&store, &terminator);

    let report = core.run().await.expect("bootstrap should succeed");
    assert_eq!(
        report.order,
        vec![
            services::FAULT_BOUNDARY,
            services::RESOURCE_MONITOR,
            services::CIRCUIT_BREAKERS,
            services::DATASTORE,
            services::TASK_SCHEDULER,
        ]
    );
    assert!(report.statuses.values().all(|status| *status == ServiceStatus::Ready));
    assert!(core.fault_boundary().is_active());

    let health = core.health();
    assert!(health.is_healthy());
    assert!(health.datastore.initialized);
    assert!(health.scheduler.running);

    let rows = core.datastore().query("SELECT 1", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);

    core.scheduler()
        .queue_task("warm-cache", |_ctx| async { Ok(()) }, TaskOptions::default())
        .unwrap();
    core.scheduler().wait_until_idle().await;
    assert_eq!(core.scheduler().metrics().tasks_completed, 1);

    core.shutdown().await;

    assert!(store.closed.load(Ordering::SeqCst));
    assert!(!core.fault_boundary().is_active());
    for name in [
        services::FAULT_BOUNDARY,
        services::CIRCUIT_BREAKERS,
        services::DATASTORE,
        services::RESOURCE_MONITOR,
        services::TASK_SCHEDULER,
    ] {
        assert_eq!(core.service_status(name), Some(ServiceStatus::Stopped), "{name}");
    }
    assert!(core
        .scheduler()
        .queue_task("late", |_ctx| async { Ok(()) }, TaskOptions::default())
        .is_err());
    assert!(terminator.exit_codes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_critical_datastore_is_fatal() {
    let store = MemoryDatastore::new();
    store.set_available(false);
    let terminator = RecordingTerminator::new();
    let core = build(&store, &terminator);

    assert!(core.run().await.is_none());

    // One bootstrap attempt, each making its own connection attempts
    assert_eq!(store.connects.load(Ordering::SeqCst), 3);
    assert_eq!(core.service_status(services::DATASTORE), Some(ServiceStatus::Failed));
    assert_eq!(core.service_status(services::TASK_SCHEDULER), Some(ServiceStatus::Pending));
    assert_eq!(terminator.exit_codes(), vec![system::FATAL_EXIT_CODE]);

    let stats = core.fault_boundary().error_stats(5);
    assert_eq!(stats.fatal, 1);
    assert_eq!(stats.recent.last().map(|record| record.severity), Some(FaultSeverity::Fatal));

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_optional_datastore_degrades() {
    let store = MemoryDatastore::new();
    store.set_available(false);
    let terminator = RecordingTerminator::new();

    let mut config = test_config();
    config.database.critical = false;
    let core = SubstrateCore::builder(config)
        .connector(store.connector())
        .terminator(Arc::clone(&terminator) as Arc<dyn ProcessTerminator>)
        .build()
        .unwrap();

    let report = core.run().await.expect("bootstrap should carry on without the datastore");
    assert_eq!(report.degraded(), vec![services::DATASTORE]);
    assert_eq!(core.service_status(services::TASK_SCHEDULER), Some(ServiceStatus::Ready));
    assert!(!core.health().is_healthy());
    assert!(terminator.exit_codes().is_empty());

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reported_errors_are_critical_background_faults() {
    let store = MemoryDatastore::new();
    let terminator = RecordingTerminator::new();
    let core = build(&store, &terminator);
    core.run().await.expect("bootstrap should succeed");

    core.report_error(&SubstrateError::Internal("cache rebuild failed".to_string()))
        .await;

    let stats = core.fault_boundary().error_stats(1);
    assert_eq!(stats.critical, 1);
    assert!(terminator.exit_codes().is_empty());

    core.shutdown().await;
}

#[tokio::test]
async fn test_inactive_boundary_only_records() {
    let terminator = RecordingTerminator::new();
    let boundary = FaultBoundary::new(test_config().fault_boundary)
        .with_terminator(Arc::clone(&terminator) as Arc<dyn ProcessTerminator>);

    let outcome: Option<()> = boundary
        .run_top_level(async { Err(SubstrateError::Internal("boom".to_string())) })
        .await;

    assert!(outcome.is_none());
    assert_eq!(boundary.error_stats(1).fatal, 1);
    assert!(terminator.exit_codes().is_empty());
}
