//! # Substrate Core
//!
//! Dependency-injection root. Constructs every substrate component from one
//! [`SubstrateConfig`], registers them with [`ServiceBootstrap`] and owns them
//! for the life of the process. Tests build isolated instances with mock
//! connectors, telemetry and terminators through [`SubstrateCoreBuilder`].
//!
//! Start order is fault boundary, memory monitoring, circuit breakers,
//! datastore, scheduler. Teardown runs in reverse, except that draining the
//! scheduler also stops memory monitoring before the datastore closes. The
//! fault boundary is deactivated last.

use super::bootstrap::{BootstrapReport, ServiceBootstrap, ServiceOptions, ServiceStatus};
use crate::config::{ConfigManager, SubstrateConfig};
use crate::constants::{components, services};
use crate::database::{DatastoreConnector, DatastoreStatus, GuardedDatastore, PgConnector};
use crate::error::{Result, SubstrateError};
use crate::events::EventPublisher;
use crate::fault::{
    ErrorStats, ExitProcessTerminator, FaultBoundary, FaultCategory, FnRecoveryHandler, ProcessTerminator,
};
use crate::resilience::{CircuitBreakerManager, SystemCircuitBreakerMetrics};
use crate::scheduler::{SchedulerStatus, TaskScheduler};
use crate::telemetry::{ChannelMemoryTelemetry, MemoryPressureListener, MemoryPressureMonitor, MemoryTelemetry};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Aggregated health of every component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstrateHealth {
    pub services: BTreeMap<String, ServiceStatus>,
    pub datastore: DatastoreStatus,
    pub scheduler: SchedulerStatus,
    pub circuit_breakers: SystemCircuitBreakerMetrics,
    pub faults: ErrorStats,
    pub memory_pressure: bool,
}

impl SubstrateHealth {
    /// Every service ready and no circuit open
    pub fn is_healthy(&self) -> bool {
        self.services
            .values()
            .all(|status| *status == ServiceStatus::Ready)
            && self.circuit_breakers.unhealthy_circuits().is_empty()
    }
}

/// Builder for [`SubstrateCore`]
pub struct SubstrateCoreBuilder {
    config: SubstrateConfig,
    connector: Option<Arc<dyn DatastoreConnector>>,
    telemetry: Option<Arc<dyn MemoryTelemetry>>,
    terminator: Option<Arc<dyn ProcessTerminator>>,
}

impl SubstrateCoreBuilder {
    pub fn new(config: SubstrateConfig) -> Self {
        Self {
            config,
            connector: None,
            telemetry: None,
            terminator: None,
        }
    }

    /// Datastore connector; PostgreSQL by default
    pub fn connector(mut self, connector: Arc<dyn DatastoreConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Memory telemetry source; an in-process channel by default
    pub fn telemetry(mut self, telemetry: Arc<dyn MemoryTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Fatal-fault terminator; exits the process by default
    pub fn terminator(mut self, terminator: Arc<dyn ProcessTerminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    pub fn build(self) -> Result<Arc<SubstrateCore>> {
        self.config.validate()?;
        SubstrateCore::assemble(
            self.config,
            self.connector.unwrap_or_else(|| Arc::new(PgConnector)),
            self.telemetry
                .unwrap_or_else(|| Arc::new(ChannelMemoryTelemetry::default())),
            self.terminator
                .unwrap_or_else(|| Arc::new(ExitProcessTerminator)),
        )
    }
}

/// Owner of every substrate component
pub struct SubstrateCore {
    config: SubstrateConfig,
    events: EventPublisher,
    fault_boundary: Arc<FaultBoundary>,
    circuit_breakers: CircuitBreakerManager,
    datastore: Arc<GuardedDatastore>,
    memory_monitor: Arc<MemoryPressureMonitor>,
    scheduler: TaskScheduler,
    bootstrap: ServiceBootstrap,
}

impl std::fmt::Debug for SubstrateCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubstrateCore")
            .field("bootstrap", &self.bootstrap)
            .field("datastore", &self.datastore)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl SubstrateCore {
    pub fn builder(config: SubstrateConfig) -> SubstrateCoreBuilder {
        SubstrateCoreBuilder::new(config)
    }

    /// Build against PostgreSQL from a loaded configuration
    pub fn from_config_manager(config_manager: &ConfigManager) -> Result<Arc<Self>> {
        info!(
            environment = config_manager.environment(),
            "🔧 CORE: Initializing substrate from configuration"
        );
        Self::builder(config_manager.config().clone()).build()
    }

    fn assemble(
        config: SubstrateConfig,
        connector: Arc<dyn DatastoreConnector>,
        telemetry: Arc<dyn MemoryTelemetry>,
        terminator: Arc<dyn ProcessTerminator>,
    ) -> Result<Arc<Self>> {
        info!("🏗️ CORE: Creating substrate components");
        let events = EventPublisher::new(config.events.channel_capacity);

        let fault_boundary = Arc::new(
            FaultBoundary::new(config.fault_boundary.clone())
                .with_terminator(terminator)
                .with_events(events.clone()),
        );

        let circuit_breakers =
            CircuitBreakerManager::from_config(&config.circuit_breakers).with_events(events.clone());
        let datastore = Arc::new(GuardedDatastore::new(
            config.database.clone(),
            connector,
            circuit_breakers.get_circuit_breaker(components::DATASTORE),
        ));

        let memory_monitor = Arc::new(MemoryPressureMonitor::new(telemetry).with_events(events.clone()));
        let scheduler = TaskScheduler::with_integrations(
            config.scheduler.clone(),
            Some(Arc::clone(&fault_boundary)),
            Some(events.clone()),
        );

        let core = Arc::new(Self {
            bootstrap: ServiceBootstrap::new(config.bootstrap.clone()).with_events(events.clone()),
            config,
            events,
            fault_boundary,
            circuit_breakers,
            datastore,
            memory_monitor,
            scheduler,
        });

        core.register_recovery_handlers();
        core.register_services()?;
        info!("✅ CORE: Substrate components registered");
        Ok(core)
    }

    fn register_recovery_handlers(&self) {
        let datastore = Arc::clone(&self.datastore);
        self.fault_boundary.register_recovery_handler(
            FaultCategory::Database,
            Arc::new(FnRecoveryHandler::new(move |_fault| {
                let datastore = Arc::clone(&datastore);
                async move {
                    datastore.perform_health_check().await?;
                    Ok::<_, anyhow::Error>(())
                }
                .boxed()
            })),
        );

        let scheduler = self.scheduler.clone();
        self.fault_boundary.register_recovery_handler(
            FaultCategory::Memory,
            Arc::new(FnRecoveryHandler::new(move |_fault| {
                scheduler.handle_memory_pressure();
                async { Ok::<_, anyhow::Error>(()) }.boxed()
            })),
        );
    }

    fn register_services(&self) -> Result<()> {
        let boundary = Arc::clone(&self.fault_boundary);
        let boundary_for_shutdown = Arc::clone(&self.fault_boundary);
        self.bootstrap.register_service(
            services::FAULT_BOUNDARY,
            move || {
                boundary.activate();
                async { Ok(()) }
            },
            ServiceOptions::default().critical().with_shutdown(move || {
                boundary_for_shutdown.deactivate();
                async { Ok(()) }
            }),
        )?;

        let monitor_task: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::new(Mutex::new(None));
        let (monitor, boundary, listener, task_slot) = (
            Arc::clone(&self.memory_monitor),
            Arc::clone(&self.fault_boundary),
            Arc::new(self.scheduler.clone()) as Arc<dyn MemoryPressureListener>,
            Arc::clone(&monitor_task),
        );
        let (stopper, stop_slot) = (Arc::clone(&self.memory_monitor), monitor_task);
        self.bootstrap.register_service(
            services::RESOURCE_MONITOR,
            move || {
                let signals = monitor.subscribe();
                let (runner, listener) = (Arc::clone(&monitor), Arc::clone(&listener));
                let handle = boundary.spawn_guarded(services::RESOURCE_MONITOR, FaultCategory::Memory, async move {
                    runner.run(signals, listener).await;
                    Ok(())
                });
                *task_slot.lock() = Some(handle);
                async { Ok(()) }
            },
            ServiceOptions::default()
                .with_dependencies([services::FAULT_BOUNDARY])
                .with_shutdown(move || {
                    // Usually already stopped by the scheduler's drain
                    stopper.stop();
                    let handle = stop_slot.lock().take();
                    async move {
                        if let Some(handle) = handle {
                            if let Err(err) = handle.await {
                                warn!(error = %err, "Memory monitor task ended abnormally");
                            }
                        }
                        Ok(())
                    }
                }),
        )?;

        let manager = self.circuit_breakers.clone();
        self.bootstrap.register_service(
            services::CIRCUIT_BREAKERS,
            move || {
                info!(
                    components = ?manager.list_components(),
                    health_score = manager.system_health_score(),
                    "🛡️ CORE: Circuit breakers ready"
                );
                async { Ok(()) }
            },
            ServiceOptions::default().with_dependencies([services::FAULT_BOUNDARY, services::RESOURCE_MONITOR]),
        )?;

        let datastore = Arc::clone(&self.datastore);
        let checker = Arc::clone(&self.datastore);
        let closer = Arc::clone(&self.datastore);
        let mut datastore_options = ServiceOptions::default()
            .with_dependencies([services::FAULT_BOUNDARY, services::CIRCUIT_BREAKERS])
            // initialize() already retries the connection with backoff
            .with_max_attempts(1)
            .with_health_check(move || {
                let checker = Arc::clone(&checker);
                async move { checker.perform_health_check().await.is_ok() }
            })
            .with_shutdown(move || {
                let closer = Arc::clone(&closer);
                async move {
                    closer.shutdown().await;
                    Ok(())
                }
            });
        if self.config.database.critical {
            datastore_options = datastore_options.critical();
        }
        self.bootstrap.register_service(
            services::DATASTORE,
            move || {
                let datastore = Arc::clone(&datastore);
                async move {
                    datastore.initialize().await?;
                    Ok::<_, anyhow::Error>(())
                }
            },
            datastore_options,
        )?;

        let scheduler = self.scheduler.clone();
        let draining = self.scheduler.clone();
        let monitor = Arc::clone(&self.memory_monitor);
        let grace = self.config.scheduler.shutdown_grace();
        self.bootstrap.register_service(
            services::TASK_SCHEDULER,
            move || {
                scheduler.start();
                async { Ok(()) }
            },
            ServiceOptions::default()
                .critical()
                .with_dependencies([services::FAULT_BOUNDARY, services::RESOURCE_MONITOR])
                .with_timeout(grace + self.config.bootstrap.default_service_timeout())
                .with_shutdown(move || {
                    let draining = draining.clone();
                    let monitor = Arc::clone(&monitor);
                    async move {
                        draining.shutdown(grace).await;
                        monitor.stop();
                        Ok(())
                    }
                }),
        )?;

        Ok(())
    }

    /// Start every service in dependency order
    pub async fn bootstrap(&self) -> Result<BootstrapReport> {
        let report = self.bootstrap.bootstrap().await?;
        if !report.degraded().is_empty() {
            warn!(degraded = ?report.degraded(), "⚠️ CORE: Substrate running degraded");
        }
        Ok(report)
    }

    /// Bootstrap inside the fault boundary; a failed bootstrap is fatal
    pub async fn run(&self) -> Option<BootstrapReport> {
        self.fault_boundary.run_top_level(self.bootstrap()).await
    }

    /// Tear everything down in reverse start order
    pub async fn shutdown(&self) {
        info!("🛑 CORE: Shutting down substrate");
        self.bootstrap.shutdown().await;
        info!("🛑 CORE: Substrate stopped");
    }

    pub fn config(&self) -> &SubstrateConfig {
        &self.config
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn fault_boundary(&self) -> &Arc<FaultBoundary> {
        &self.fault_boundary
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerManager {
        &self.circuit_breakers
    }

    pub fn datastore(&self) -> &Arc<GuardedDatastore> {
        &self.datastore
    }

    pub fn memory_monitor(&self) -> &Arc<MemoryPressureMonitor> {
        &self.memory_monitor
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn service_status(&self, name: &str) -> Option<ServiceStatus> {
        self.bootstrap.service_status(name)
    }

    pub fn health(&self) -> SubstrateHealth {
        SubstrateHealth {
            services: self.bootstrap.statuses(),
            datastore: self.datastore.status(),
            scheduler: self.scheduler.status(),
            circuit_breakers: self.circuit_breakers.system_metrics(),
            faults: self.fault_boundary.error_stats(10),
            memory_pressure: self.memory_monitor.is_under_pressure(),
        }
    }

    /// Route a typed error to the fault boundary as a background fault
    pub async fn report_error(&self, error: &SubstrateError) {
        self.fault_boundary
            .capture_error(error, crate::fault::FaultOrigin::Background)
            .await;
    }
}
