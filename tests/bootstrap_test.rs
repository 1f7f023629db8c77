//! Integration tests for dependency-ordered service bootstrap

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use substrate_core::config::BootstrapConfig;
use substrate_core::events::{EventPublisher, PublishedEvent, SubstrateEvent};
use tokio::sync::broadcast;
use substrate_core::orchestration::{BootstrapError, ServiceBootstrap, ServiceOptions, ServiceStatus};

fn bootstrap_config() -> BootstrapConfig {
    BootstrapConfig {
        service_retry_attempts: 3,
        retry_base_delay_ms: 10,
        default_service_timeout_ms: 1_000,
    }
}

/// Register a service whose init fails until `succeed_on` (never when 0)
fn register(
    bootstrap: &ServiceBootstrap,
    name: &'static str,
    succeed_on: u32,
    options: ServiceOptions,
    started: &Arc<Mutex<Vec<&'static str>>>,
) -> Arc<AtomicU32> {
    let attempts = Arc::new(AtomicU32::new(0));
    let (counter, started) = (Arc::clone(&attempts), Arc::clone(started));
    bootstrap
        .register_service(
            name,
            move || {
                let counter = Arc::clone(&counter);
                let started = Arc::clone(&started);
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    anyhow::ensure!(succeed_on != 0 && attempt >= succeed_on, "{name} attempt {attempt} failed");
                    started.lock().push(name);
                    Ok(())
                }
            },
            options,
        )
        .unwrap();
    attempts
}

fn drain_names(receiver: &mut broadcast::Receiver<PublishedEvent>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(published) = receiver.try_recv() {
        names.push(published.name());
    }
    names
}

#[tokio::test(start_paused = true)]
async fn test_degraded_root_blocks_critical_dependent() {
    let events = EventPublisher::new(64);
    let mut receiver = events.subscribe();
    let bootstrap = ServiceBootstrap::new(bootstrap_config()).with_events(events);
    let started = Arc::new(Mutex::new(Vec::new()));

    // Registered out of dependency order on purpose
    let c_attempts = register(
        &bootstrap,
        "c",
        1,
        ServiceOptions::default().with_dependencies(["a", "b"]).critical(),
        &started,
    );
    let a_attempts = register(&bootstrap, "a", 0, ServiceOptions::default(), &started);
    register(
        &bootstrap,
        "b",
        1,
        ServiceOptions::default().with_dependencies(["a"]),
        &started,
    );

    let err = bootstrap.bootstrap().await.unwrap_err();
    assert!(matches!(
        err,
        BootstrapError::CriticalServiceFailed { ref service, .. } if service == "c"
    ));

    assert_eq!(a_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(c_attempts.load(Ordering::SeqCst), 0);
    assert_eq!(bootstrap.service_status("a"), Some(ServiceStatus::Degraded));
    assert_eq!(bootstrap.service_status("b"), Some(ServiceStatus::Ready));
    assert_eq!(bootstrap.service_status("c"), Some(ServiceStatus::Failed));
    assert_eq!(*started.lock(), vec!["b"]);
    assert!(bootstrap.last_error("a").unwrap().contains("a attempt 3 failed"));
    assert!(bootstrap.last_error("c").unwrap().contains("dependencies: a"));

    assert_eq!(
        drain_names(&mut receiver),
        vec!["service.degraded", "service.ready", "service.failed", "bootstrap.failed"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_degraded_middle_blocks_critical_dependent() {
    let bootstrap = ServiceBootstrap::new(bootstrap_config());
    let started = Arc::new(Mutex::new(Vec::new()));

    register(&bootstrap, "a", 1, ServiceOptions::default(), &started);
    let b_attempts = register(
        &bootstrap,
        "b",
        0,
        ServiceOptions::default().with_dependencies(["a"]),
        &started,
    );
    let c_attempts = register(
        &bootstrap,
        "c",
        1,
        ServiceOptions::default().with_dependencies(["a", "b"]).critical(),
        &started,
    );

    let err = bootstrap.bootstrap().await.unwrap_err();
    assert!(matches!(
        err,
        BootstrapError::CriticalServiceFailed { ref service, ref reason } if service == "c" && reason.contains("dependencies: b")
    ));
    assert_eq!(b_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(c_attempts.load(Ordering::SeqCst), 0);
    assert_eq!(bootstrap.service_status("a"), Some(ServiceStatus::Ready));
    assert_eq!(bootstrap.service_status("b"), Some(ServiceStatus::Degraded));
    assert_eq!(bootstrap.service_status("c"), Some(ServiceStatus::Failed));
    assert_eq!(*started.lock(), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_non_critical_dependents_tolerate_degraded_service() {
    let events = EventPublisher::new(64);
    let mut receiver = events.subscribe();
    let bootstrap = ServiceBootstrap::new(bootstrap_config()).with_events(events);
    let started = Arc::new(Mutex::new(Vec::new()));

    register(&bootstrap, "a", 0, ServiceOptions::default(), &started);
    register(&bootstrap, "b", 1, ServiceOptions::default().with_dependencies(["a"]), &started);
    register(
        &bootstrap,
        "c",
        1,
        ServiceOptions::default().with_dependencies(["a", "b"]),
        &started,
    );

    let report = bootstrap.bootstrap().await.unwrap();
    assert_eq!(report.order, vec!["a", "b", "c"]);
    assert_eq!(report.degraded(), vec!["a"]);
    assert!(report.failed().is_empty());
    assert_eq!(*started.lock(), vec!["b", "c"]);
    assert_eq!(
        drain_names(&mut receiver),
        vec!["service.degraded", "service.ready", "service.ready", "bootstrap.complete"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_critical_failure_aborts_remaining_services() {
    let events = EventPublisher::new(64);
    let mut receiver = events.subscribe();
    let bootstrap = ServiceBootstrap::new(bootstrap_config()).with_events(events);
    let started = Arc::new(Mutex::new(Vec::new()));

    register(&bootstrap, "store", 0, ServiceOptions::default().critical(), &started);
    let api_attempts = register(
        &bootstrap,
        "api",
        1,
        ServiceOptions::default().with_dependencies(["store"]),
        &started,
    );

    let err = bootstrap.bootstrap().await.unwrap_err();
    assert!(matches!(
        err,
        BootstrapError::CriticalServiceFailed { ref service, .. } if service == "store"
    ));
    assert_eq!(bootstrap.service_status("store"), Some(ServiceStatus::Failed));
    assert_eq!(bootstrap.service_status("api"), Some(ServiceStatus::Pending));
    assert_eq!(api_attempts.load(Ordering::SeqCst), 0);

    let mut saw_failure = false;
    while let Ok(published) = receiver.try_recv() {
        if let SubstrateEvent::BootstrapFailed { error } = published.event {
            assert!(error.contains("store"));
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

#[tokio::test(start_paused = true)]
async fn test_dependent_of_unknown_service_fails() {
    let bootstrap = ServiceBootstrap::new(bootstrap_config());
    let started = Arc::new(Mutex::new(Vec::new()));

    let attempts = register(
        &bootstrap,
        "reporting",
        1,
        ServiceOptions::default().with_dependencies(["warehouse"]),
        &started,
    );
    register(&bootstrap, "web", 1, ServiceOptions::default(), &started);

    let report = bootstrap.bootstrap().await.unwrap();
    assert_eq!(report.failed(), vec!["reporting"]);
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
    assert_eq!(bootstrap.service_status("web"), Some(ServiceStatus::Ready));
    assert!(bootstrap
        .last_error("reporting")
        .unwrap()
        .contains("warehouse"));
}

#[tokio::test]
async fn test_cycle_leaves_services_unstarted() {
    let bootstrap = ServiceBootstrap::new(bootstrap_config());
    let started = Arc::new(Mutex::new(Vec::new()));

    register(&bootstrap, "a", 1, ServiceOptions::default().with_dependencies(["c"]), &started);
    register(&bootstrap, "b", 1, ServiceOptions::default().with_dependencies(["a"]), &started);
    register(&bootstrap, "c", 1, ServiceOptions::default().with_dependencies(["b"]), &started);

    match bootstrap.bootstrap().await {
        Err(BootstrapError::DependencyCycle { cycle }) => {
            assert_eq!(cycle.first(), cycle.last());
            assert_eq!(cycle.len(), 4);
        }
        other => panic!("expected a dependency cycle, got {other:?}"),
    }
    assert!(started.lock().is_empty());
}
