//! # Dependency-Ordered Bootstrap
//!
//! Brings registered services up in dependency order and tears them down in
//! reverse.
//!
//! Each service is started once all of its dependencies are `Ready`. A
//! `Degraded` dependency is enough for non-critical dependents only; a critical
//! service on top of one fails. Initialisation is retried with exponential backoff and bounded
//! by a per-attempt timeout, then confirmed by an optional health check. A
//! non-critical service that never comes up is marked `Degraded` and bootstrap
//! carries on; a critical one aborts the whole bootstrap.

use super::dependency_graph::DependencyGraph;
use crate::config::BootstrapConfig;
use crate::events::{EventPublisher, SubstrateEvent};
use crate::resilience::exponential_delay;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

pub type ServiceInit = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type ServiceHealthCheck = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;
pub type ServiceShutdown = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Service '{0}' is already registered")]
    DuplicateService(String),
    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },
    #[error("Critical service '{service}' failed to start: {reason}")]
    CriticalServiceFailed { service: String, reason: String },
    #[error("Bootstrap has already run")]
    AlreadyBootstrapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Pending,
    Starting,
    Ready,
    /// Initialisation never succeeded; non-critical dependents still start
    Degraded,
    Failed,
    Stopped,
}

impl ServiceStatus {
    /// Whether a dependent may start on top of this service
    pub fn satisfies(self, dependent_critical: bool) -> bool {
        match self {
            ServiceStatus::Ready => true,
            ServiceStatus::Degraded => !dependent_critical,
            _ => false,
        }
    }

    /// Ready or degraded, so teardown applies
    pub fn was_started(self) -> bool {
        matches!(self, ServiceStatus::Ready | ServiceStatus::Degraded)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::Starting => "starting",
            ServiceStatus::Ready => "ready",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::Failed => "failed",
            ServiceStatus::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Registration options for a service
#[derive(Clone, Default)]
pub struct ServiceOptions {
    pub dependencies: Vec<String>,
    pub critical: bool,
    /// Per-attempt bound on the init routine; falls back to configuration
    pub timeout: Option<Duration>,
    /// Start attempts; falls back to `service_retry_attempts`
    pub max_attempts: Option<u32>,
    pub health_check: Option<ServiceHealthCheck>,
    pub shutdown: Option<ServiceShutdown>,
}

impl std::fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("dependencies", &self.dependencies)
            .field("critical", &self.critical)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("health_check", &self.health_check.is_some())
            .field("shutdown", &self.shutdown.is_some())
            .finish()
    }
}

impl ServiceOptions {
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_health_check<F, Fut>(mut self, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.health_check = Some(Arc::new(move || check().boxed()));
        self
    }

    pub fn with_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.shutdown = Some(Arc::new(move || hook().boxed()));
        self
    }
}

/// A registered service and its progress
pub struct ServiceDescriptor {
    pub name: String,
    init: ServiceInit,
    pub options: ServiceOptions,
    pub status: ServiceStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub ready_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("status", &self.status)
            .field("attempts", &self.attempts)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Outcome of a completed bootstrap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub order: Vec<String>,
    pub statuses: BTreeMap<String, ServiceStatus>,
    pub elapsed: Duration,
}

impl BootstrapReport {
    pub fn degraded(&self) -> Vec<&str> {
        self.with_status(ServiceStatus::Degraded)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.with_status(ServiceStatus::Failed)
    }

    fn with_status(&self, status: ServiceStatus) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| self.statuses.get(name.as_str()) == Some(&status))
            .map(String::as_str)
            .collect()
    }
}

#[derive(Default)]
struct BootstrapState {
    services: Vec<ServiceDescriptor>,
    /// Start order of the last bootstrap, reused for teardown
    order: Vec<String>,
    bootstrapped: bool,
    shut_down: bool,
}

impl BootstrapState {
    fn service_mut(&mut self, name: &str) -> Option<&mut ServiceDescriptor> {
        self.services.iter_mut().find(|service| service.name == name)
    }

    fn status_of(&self, name: &str) -> Option<ServiceStatus> {
        self.services
            .iter()
            .find(|service| service.name == name)
            .map(|service| service.status)
    }

    fn set_status(&mut self, name: &str, status: ServiceStatus) {
        if let Some(service) = self.service_mut(name) {
            service.status = status;
            if status == ServiceStatus::Ready {
                service.ready_at = Some(chrono::Utc::now());
            }
        }
    }

    fn statuses(&self) -> BTreeMap<String, ServiceStatus> {
        self.services
            .iter()
            .map(|service| (service.name.clone(), service.status))
            .collect()
    }
}

/// Everything needed to start one service outside the lock
struct StartPlan {
    name: String,
    init: ServiceInit,
    critical: bool,
    timeout: Duration,
    max_attempts: u32,
    health_check: Option<ServiceHealthCheck>,
}

/// Registry of services started in dependency order
pub struct ServiceBootstrap {
    config: BootstrapConfig,
    state: Mutex<BootstrapState>,
    events: Option<EventPublisher>,
}

impl std::fmt::Debug for ServiceBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBootstrap")
            .field("config", &self.config)
            .field("statuses", &self.statuses())
            .finish()
    }
}

impl ServiceBootstrap {
    pub fn new(config: BootstrapConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BootstrapState::default()),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    pub fn register_service<F, Fut>(
        &self,
        name: impl Into<String>,
        init: F,
        options: ServiceOptions,
    ) -> Result<(), BootstrapError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let mut state = self.state.lock();
        if state.services.iter().any(|service| service.name == name) {
            return Err(BootstrapError::DuplicateService(name));
        }

        debug!(
            service = %name,
            dependencies = ?options.dependencies,
            critical = options.critical,
            "Service registered"
        );
        state.services.push(ServiceDescriptor {
            name,
            init: Arc::new(move || init().boxed()),
            options,
            status: ServiceStatus::Pending,
            attempts: 0,
            last_error: None,
            ready_at: None,
        });
        Ok(())
    }

    pub fn service_status(&self, name: &str) -> Option<ServiceStatus> {
        self.state.lock().status_of(name)
    }

    pub fn statuses(&self) -> BTreeMap<String, ServiceStatus> {
        self.state.lock().statuses()
    }

    pub fn last_error(&self, name: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .services
            .iter()
            .find(|service| service.name == name)
            .and_then(|service| service.last_error.clone())
    }

    /// Start every registered service in dependency order
    pub async fn bootstrap(&self) -> Result<BootstrapReport, BootstrapError> {
        let started = Instant::now();
        let order = {
            let mut state = self.state.lock();
            if state.bootstrapped {
                return Err(BootstrapError::AlreadyBootstrapped);
            }
            state.bootstrapped = true;

            let mut graph = DependencyGraph::new();
            for service in &state.services {
                graph.add_node(service.name.clone(), service.options.dependencies.iter().cloned());
            }
            for (service, dependency) in graph.unknown_dependencies() {
                warn!(service = %service, dependency = %dependency, "⚠️ BOOTSTRAP: Unknown dependency");
            }

            match graph.topological_order() {
                Ok(order) => {
                    state.order = order.clone();
                    order
                }
                Err(cycle) => {
                    drop(state);
                    let error = BootstrapError::DependencyCycle { cycle };
                    error!(error = %error, "❌ BOOTSTRAP: Cannot order services");
                    self.publish(SubstrateEvent::BootstrapFailed {
                        error: error.to_string(),
                    });
                    return Err(error);
                }
            }
        };

        info!(services = order.len(), order = ?order, "🚀 BOOTSTRAP: Starting services");

        for name in &order {
            let plan = match self.prepare(name) {
                Ok(plan) => plan,
                Err(reason) => {
                    self.mark_failed(name, &reason);
                    if self.is_critical(name) {
                        return Err(self.abort(name, reason));
                    }
                    continue;
                }
            };

            match self.start_service(&plan).await {
                Ok(()) => {
                    self.state.lock().set_status(name, ServiceStatus::Ready);
                    info!(service = %name, "✅ BOOTSTRAP: Service ready");
                    self.publish(SubstrateEvent::ServiceReady {
                        service: name.clone(),
                    });
                }
                Err(reason) if plan.critical => {
                    self.mark_failed(name, &reason);
                    return Err(self.abort(name, reason));
                }
                Err(reason) => {
                    {
                        let mut state = self.state.lock();
                        state.set_status(name, ServiceStatus::Degraded);
                        if let Some(service) = state.service_mut(name) {
                            service.last_error = Some(reason.clone());
                        }
                    }
                    warn!(service = %name, error = %reason, "⚠️ BOOTSTRAP: Service degraded");
                    self.publish(SubstrateEvent::ServiceDegraded {
                        service: name.clone(),
                        error: reason,
                    });
                }
            }
        }

        let elapsed = started.elapsed();
        let statuses = self.statuses();
        info!(
            services = order.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "🎉 BOOTSTRAP: Complete"
        );
        self.publish(SubstrateEvent::BootstrapComplete {
            services: order.len(),
            elapsed_ms: elapsed.as_millis() as u64,
        });

        Ok(BootstrapReport {
            order,
            statuses,
            elapsed,
        })
    }

    /// Run shutdown hooks of started services in reverse start order.
    ///
    /// Hook failures are logged and do not stop the teardown.
    pub async fn shutdown(&self) {
        let hooks: Vec<(String, Option<ServiceShutdown>, Duration)> = {
            let mut state = self.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;

            let order = state.order.clone();
            order
                .iter()
                .rev()
                .filter_map(|name| {
                    let service = state.services.iter().find(|service| &service.name == name)?;
                    service.status.was_started().then(|| {
                        (
                            name.clone(),
                            service.options.shutdown.clone(),
                            service.options.timeout.unwrap_or_else(|| self.config.default_service_timeout()),
                        )
                    })
                })
                .collect()
        };

        info!(services = hooks.len(), "🛑 BOOTSTRAP: Shutting down services");
        for (name, hook, limit) in hooks {
            if let Some(hook) = hook {
                match timeout(limit, hook()).await {
                    Ok(Ok(())) => debug!(service = %name, "Service stopped"),
                    Ok(Err(err)) => warn!(service = %name, error = %err, "⚠️ BOOTSTRAP: Shutdown hook failed"),
                    Err(_) => warn!(service = %name, timeout_ms = limit.as_millis() as u64, "⚠️ BOOTSTRAP: Shutdown hook timed out"),
                }
            }
            self.state.lock().set_status(&name, ServiceStatus::Stopped);
        }
        info!("🛑 BOOTSTRAP: All services stopped");
    }

    /// Check dependencies and capture what is needed to start `name`
    fn prepare(&self, name: &str) -> Result<StartPlan, String> {
        let mut state = self.state.lock();
        let (dependencies, critical, timeout, max_attempts, health_check, init) = {
            let service = state
                .services
                .iter()
                .find(|service| service.name == name)
                .ok_or_else(|| format!("service '{name}' is not registered"))?;
            (
                service.options.dependencies.clone(),
                service.options.critical,
                service
                    .options
                    .timeout
                    .unwrap_or_else(|| self.config.default_service_timeout()),
                service
                    .options
                    .max_attempts
                    .unwrap_or(self.config.service_retry_attempts)
                    .max(1),
                service.options.health_check.clone(),
                Arc::clone(&service.init),
            )
        };

        let unsatisfied: Vec<String> = dependencies
            .into_iter()
            .filter(|dependency| {
                !state
                    .status_of(dependency)
                    .is_some_and(|status| status.satisfies(critical))
            })
            .collect();
        if !unsatisfied.is_empty() {
            return Err(format!("unsatisfied dependencies: {}", unsatisfied.join(", ")));
        }

        state.set_status(name, ServiceStatus::Starting);
        Ok(StartPlan {
            name: name.to_string(),
            init,
            critical,
            timeout,
            max_attempts,
            health_check,
        })
    }

    async fn start_service(&self, plan: &StartPlan) -> Result<(), String> {
        let max_attempts = plan.max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if let Some(service) = self.state.lock().service_mut(&plan.name) {
                service.attempts = attempt;
            }
            debug!(service = %plan.name, attempt = attempt, "Starting service");

            match self.attempt_start(plan).await {
                Ok(()) => return Ok(()),
                Err(reason) => {
                    warn!(
                        service = %plan.name,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %reason,
                        "🔄 BOOTSTRAP: Service start attempt failed"
                    );
                    if let Some(service) = self.state.lock().service_mut(&plan.name) {
                        service.last_error = Some(reason.clone());
                    }
                    last_error = reason;
                }
            }

            if attempt < max_attempts {
                sleep(exponential_delay(self.config.retry_base_delay(), attempt)).await;
            }
        }

        Err(format!("gave up after {max_attempts} attempts: {last_error}"))
    }

    async fn attempt_start(&self, plan: &StartPlan) -> Result<(), String> {
        match timeout(plan.timeout, (plan.init)()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(format!("{err:#}")),
            Err(_) => return Err(format!("initialisation timed out after {:?}", plan.timeout)),
        }

        if let Some(check) = &plan.health_check {
            match timeout(plan.timeout, check()).await {
                Ok(true) => {}
                Ok(false) => return Err("health check failed".to_string()),
                Err(_) => return Err(format!("health check timed out after {:?}", plan.timeout)),
            }
        }
        Ok(())
    }

    fn is_critical(&self, name: &str) -> bool {
        let state = self.state.lock();
        state
            .services
            .iter()
            .any(|service| service.name == name && service.options.critical)
    }

    fn mark_failed(&self, name: &str, reason: &str) {
        {
            let mut state = self.state.lock();
            state.set_status(name, ServiceStatus::Failed);
            if let Some(service) = state.service_mut(name) {
                service.last_error = Some(reason.to_string());
            }
        }
        error!(service = %name, error = %reason, "❌ BOOTSTRAP: Service failed");
        self.publish(SubstrateEvent::ServiceFailed {
            service: name.to_string(),
            error: reason.to_string(),
        });
    }

    fn abort(&self, name: &str, reason: String) -> BootstrapError {
        let error = BootstrapError::CriticalServiceFailed {
            service: name.to_string(),
            reason,
        };
        error!(error = %error, "💥 BOOTSTRAP: Aborted");
        self.publish(SubstrateEvent::BootstrapFailed {
            error: error.to_string(),
        });
        error
    }

    fn publish(&self, event: SubstrateEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> BootstrapConfig {
        BootstrapConfig {
            service_retry_attempts: 3,
            retry_base_delay_ms: 10,
            default_service_timeout_ms: 1_000,
        }
    }

    #[test]
    fn test_degraded_only_satisfies_non_critical_dependents() {
        assert!(ServiceStatus::Ready.satisfies(true));
        assert!(ServiceStatus::Degraded.satisfies(false));
        assert!(!ServiceStatus::Degraded.satisfies(true));
        assert!(!ServiceStatus::Failed.satisfies(false));
        assert!(!ServiceStatus::Pending.satisfies(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_in_dependency_order() {
        let bootstrap = ServiceBootstrap::new(config());
        let started = Arc::new(Mutex::new(Vec::new()));

        for (name, deps) in [("api", vec!["datastore"]), ("datastore", vec!["boundary"]), ("boundary", vec![])] {
            let started = Arc::clone(&started);
            bootstrap
                .register_service(
                    name,
                    move || {
                        let started = Arc::clone(&started);
                        async move {
                            started.lock().push(name);
                            Ok(())
                        }
                    },
                    ServiceOptions::default().with_dependencies(deps),
                )
                .unwrap();
        }

        let report = bootstrap.bootstrap().await.unwrap();
        assert_eq!(*started.lock(), vec!["boundary", "datastore", "api"]);
        assert_eq!(report.order, vec!["boundary", "datastore", "api"]);
        assert!(report.statuses.values().all(|status| *status == ServiceStatus::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let bootstrap = ServiceBootstrap::new(config());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&attempts);
        bootstrap
            .register_service(
                "flaky",
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        anyhow::ensure!(attempt == 3, "attempt {attempt} failed");
                        Ok(())
                    }
                },
                ServiceOptions::default().critical(),
            )
            .unwrap();

        bootstrap.bootstrap().await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(bootstrap.service_status("flaky"), Some(ServiceStatus::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_override() {
        let bootstrap = ServiceBootstrap::new(config());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&attempts);
        bootstrap
            .register_service(
                "self-retrying",
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        anyhow::bail!("unreachable")
                    }
                },
                ServiceOptions::default().with_max_attempts(1),
            )
            .unwrap();

        let report = bootstrap.bootstrap().await.unwrap();
        assert_eq!(report.degraded(), vec!["self-retrying"]);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_health_check_counts_as_failed_attempt() {
        let bootstrap = ServiceBootstrap::new(config());
        bootstrap
            .register_service(
                "unhealthy",
                || async { Ok(()) },
                ServiceOptions::default().with_health_check(|| async { false }),
            )
            .unwrap();

        let report = bootstrap.bootstrap().await.unwrap();
        assert_eq!(report.degraded(), vec!["unhealthy"]);
        assert!(bootstrap
            .last_error("unhealthy")
            .unwrap()
            .contains("health check failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_timeout_is_enforced() {
        let bootstrap = ServiceBootstrap::new(config());
        bootstrap
            .register_service(
                "hangs",
                || async {
                    sleep(Duration::from_secs(3_600)).await;
                    Ok(())
                },
                ServiceOptions::default()
                    .critical()
                    .with_timeout(Duration::from_millis(50)),
            )
            .unwrap();

        let err = bootstrap.bootstrap().await.unwrap_err();
        assert!(matches!(err, BootstrapError::CriticalServiceFailed { ref service, .. } if service == "hangs"));
        assert_eq!(bootstrap.service_status("hangs"), Some(ServiceStatus::Failed));
    }

    #[tokio::test]
    async fn test_cycle_fails_fast() {
        let bootstrap = ServiceBootstrap::new(config());
        bootstrap
            .register_service("a", || async { Ok(()) }, ServiceOptions::default().with_dependencies(["b"]))
            .unwrap();
        bootstrap
            .register_service("b", || async { Ok(()) }, ServiceOptions::default().with_dependencies(["a"]))
            .unwrap();

        let err = bootstrap.bootstrap().await.unwrap_err();
        match err {
            BootstrapError::DependencyCycle { cycle } => assert_eq!(cycle, vec!["a", "b", "a"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(bootstrap.service_status("a"), Some(ServiceStatus::Pending));
    }

    #[tokio::test]
    async fn test_duplicate_and_repeat_bootstrap_rejected() {
        let bootstrap = ServiceBootstrap::new(config());
        bootstrap
            .register_service("only", || async { Ok(()) }, ServiceOptions::default())
            .unwrap();
        assert!(matches!(
            bootstrap.register_service("only", || async { Ok(()) }, ServiceOptions::default()),
            Err(BootstrapError::DuplicateService(_))
        ));

        bootstrap.bootstrap().await.unwrap();
        assert!(matches!(
            bootstrap.bootstrap().await,
            Err(BootstrapError::AlreadyBootstrapped)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_runs_hooks_in_reverse_order() {
        let bootstrap = ServiceBootstrap::new(config());
        let stopped = Arc::new(Mutex::new(Vec::new()));

        for (name, deps) in [("first", vec![]), ("second", vec!["first"])] {
            let stopped = Arc::clone(&stopped);
            bootstrap
                .register_service(
                    name,
                    || async { Ok(()) },
                    ServiceOptions::default()
                        .with_dependencies(deps)
                        .with_shutdown(move || {
                            let stopped = Arc::clone(&stopped);
                            async move {
                                stopped.lock().push(name);
                                Ok(())
                            }
                        }),
                )
                .unwrap();
        }

        bootstrap.bootstrap().await.unwrap();
        bootstrap.shutdown().await;
        bootstrap.shutdown().await;

        assert_eq!(*stopped.lock(), vec!["second", "first"]);
        assert_eq!(bootstrap.service_status("first"), Some(ServiceStatus::Stopped));
    }
}
