//! # Guarded Datastore Access
//!
//! Single entry point for datastore reads and writes. Every query is admitted
//! by the embedded circuit breaker, bounded by an acquisition timeout and a
//! query timeout, and recorded in the running metrics. A background health
//! check probes the pool on a fixed interval and is the breaker's out-of-band
//! recovery trigger.

use super::metrics::{QueryMetrics, QueryStats};
use super::pool::{ConnectionSettings, DatastoreConnector, DatastorePool, Row};
use super::DatastoreError;
use crate::config::DatabaseConfig;
use crate::resilience::{exponential_delay, CircuitBreaker, CircuitBreakerError, CircuitState};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const HEALTH_CHECK_QUERY: &str = "SELECT 1 AS health";
const TABLE_PRESENCE_QUERY: &str = "SELECT to_regclass($1) IS NOT NULL AS present";

/// Point-in-time view of the datastore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreStatus {
    pub initialized: bool,
    pub shut_down: bool,
    pub circuit_state: CircuitState,
    pub pool_size: u32,
    pub pool_idle: usize,
    /// Required tables found missing by the last schema check
    pub missing_tables: Vec<String>,
    pub metrics: QueryStats,
}

/// Circuit-breaker-guarded access to the shared datastore pool
pub struct GuardedDatastore {
    config: DatabaseConfig,
    connector: Arc<dyn DatastoreConnector>,
    breaker: Arc<CircuitBreaker>,
    pool: RwLock<Option<Arc<dyn DatastorePool>>>,
    metrics: Mutex<QueryMetrics>,
    missing_tables: Mutex<Vec<String>>,
    shut_down: AtomicBool,
    shutdown_token: CancellationToken,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for GuardedDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedDatastore")
            .field("breaker", &self.breaker.name())
            .field("initialized", &self.is_initialized())
            .field("shut_down", &self.shut_down.load(Ordering::Acquire))
            .finish()
    }
}

impl GuardedDatastore {
    pub fn new(
        config: DatabaseConfig,
        connector: Arc<dyn DatastoreConnector>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            config,
            connector,
            breaker,
            pool: RwLock::new(None),
            metrics: Mutex::new(QueryMetrics::new()),
            missing_tables: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
            health_task: Mutex::new(None),
        }
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.read().is_some()
    }

    /// Open the pool, attest connectivity with exponential backoff, run the
    /// best-effort schema check and start the health-check loop.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), DatastoreError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(DatastoreError::ShutDown);
        }
        if self.is_initialized() {
            debug!("Datastore already initialized");
            return Ok(());
        }

        let settings = ConnectionSettings::from_config(&self.config);
        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = String::new();

        info!(
            target_db = %settings.target(),
            attempts = attempts,
            "🗄️ DATASTORE: Initializing connection pool"
        );

        for attempt in 1..=attempts {
            match self.connect_and_attest(&settings).await {
                Ok(pool) => {
                    *self.pool.write() = Some(Arc::clone(&pool));
                    self.check_schema(&pool).await;
                    self.start_health_monitoring();
                    info!(attempt = attempt, "✅ DATASTORE: Connectivity attested");
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %err,
                        "⚠️ DATASTORE: Connection attempt failed"
                    );
                    last_error = err.to_string();
                    if attempt < attempts {
                        sleep(exponential_delay(self.config.retry_base_delay(), attempt)).await;
                    }
                }
            }
        }

        error!(attempts = attempts, last_error = %last_error, "❌ DATASTORE: Initialization failed");
        Err(DatastoreError::InitializationFailed { attempts, last_error })
    }

    async fn connect_and_attest(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn DatastorePool>, DatastoreError> {
        let connect_timeout = self.config.connection_timeout();
        let pool = timeout(connect_timeout, self.connector.connect(settings))
            .await
            .map_err(|_| DatastoreError::AcquireTimeout(connect_timeout))??;

        if let Err(err) = self.round_trip(&pool, HEALTH_CHECK_QUERY, &[]).await {
            pool.close().await;
            return Err(err);
        }
        Ok(pool)
    }

    /// Presence check for the configured tables; failures are only logged
    async fn check_schema(&self, pool: &Arc<dyn DatastorePool>) {
        if self.config.required_tables.is_empty() {
            return;
        }

        let mut missing = Vec::new();
        for table in &self.config.required_tables {
            let params = [Value::String(table.clone())];
            match self.round_trip(pool, TABLE_PRESENCE_QUERY, &params).await {
                Ok(rows) => {
                    let present = rows
                        .first()
                        .and_then(|row| row.get("present"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    if !present {
                        missing.push(table.clone());
                    }
                }
                Err(err) => {
                    warn!(table = %table, error = %err, "⚠️ DATASTORE: Schema check skipped");
                    return;
                }
            }
        }

        if missing.is_empty() {
            debug!(tables = ?self.config.required_tables, "Schema check passed");
        } else {
            warn!(missing = ?missing, "⚠️ DATASTORE: Required tables are missing");
        }
        *self.missing_tables.lock() = missing;
    }

    fn active_pool(&self) -> Result<Arc<dyn DatastorePool>, DatastoreError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(DatastoreError::ShutDown);
        }
        self.pool.read().clone().ok_or(DatastoreError::NotInitialized)
    }

    /// Acquire then execute, each raced against its own timeout
    async fn round_trip(
        &self,
        pool: &Arc<dyn DatastorePool>,
        query: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, DatastoreError> {
        let acquire_timeout = self.config.connection_timeout();
        let mut connection = timeout(acquire_timeout, pool.acquire())
            .await
            .map_err(|_| DatastoreError::AcquireTimeout(acquire_timeout))??;

        let query_timeout = self.config.query_timeout();
        timeout(query_timeout, connection.execute(query, params))
            .await
            .map_err(|_| DatastoreError::QueryTimeout(query_timeout))?
    }

    /// Execute a query through the circuit breaker.
    ///
    /// Fails with [`DatastoreError::Unavailable`] without touching the pool
    /// while the breaker is open.
    pub async fn query(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, DatastoreError> {
        let pool = self.active_pool()?;
        let started = Instant::now();

        let outcome = self
            .breaker
            .call(|| self.round_trip(&pool, query, params))
            .await;

        match outcome {
            Ok(rows) => {
                self.metrics.lock().record_success(started.elapsed());
                Ok(rows)
            }
            Err(CircuitBreakerError::CircuitOpen { component }) => {
                self.metrics.lock().record_rejection();
                Err(DatastoreError::Unavailable { resource: component })
            }
            Err(CircuitBreakerError::OperationFailed(err)) => {
                self.metrics.lock().record_failure(started.elapsed(), &err);
                debug!(error = %err, "Datastore query failed");
                Err(err)
            }
        }
    }

    /// Trivial round trip that bypasses breaker admission.
    ///
    /// Success moves an open breaker to half-open once its reset timeout has
    /// elapsed. Failure counts against a breaker that is not already open.
    pub async fn perform_health_check(&self) -> Result<Duration, DatastoreError> {
        let pool = self.active_pool()?;
        let started = Instant::now();

        match self.round_trip(&pool, HEALTH_CHECK_QUERY, &[]).await {
            Ok(_) => {
                let latency = started.elapsed();
                self.metrics.lock().record_health_check(true);
                if self.breaker.state() == CircuitState::Open && self.breaker.attempt_reset() {
                    info!("🩺 DATASTORE: Health check passed, probing recovery");
                }
                debug!(latency_ms = latency.as_millis() as u64, "Datastore health check passed");
                Ok(latency)
            }
            Err(err) => {
                self.metrics.lock().record_health_check(false);
                if self.breaker.state() != CircuitState::Open {
                    self.breaker.record_failure();
                }
                warn!(error = %err, "🩺 DATASTORE: Health check failed");
                Err(err)
            }
        }
    }

    fn start_health_monitoring(self: &Arc<Self>) {
        let mut slot = self.health_task.lock();
        if slot.is_some() {
            return;
        }

        let datastore = Arc::clone(self);
        let token = self.shutdown_token.clone();
        let interval = self.config.health_check_interval();

        *slot = Some(tokio::spawn(async move {
            debug!(interval_ms = interval.as_millis() as u64, "Datastore health monitoring started");
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = sleep(interval) => {
                        let _ = datastore.perform_health_check().await;
                    }
                }
            }
            debug!("Datastore health monitoring stopped");
        }));
    }

    /// Stop health checks and release the pool; repeated calls are no-ops
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shutdown_token.cancel();
        let health_task = self.health_task.lock().take();
        if let Some(handle) = health_task {
            let _ = handle.await;
        }

        let pool = self.pool.write().take();
        if let Some(pool) = pool {
            pool.close().await;
        }
        info!("🛑 DATASTORE: Shut down");
    }

    pub fn metrics(&self) -> QueryStats {
        self.metrics.lock().snapshot()
    }

    pub fn status(&self) -> DatastoreStatus {
        let pool = self.pool.read().clone();
        DatastoreStatus {
            initialized: pool.is_some(),
            shut_down: self.shut_down.load(Ordering::Acquire),
            circuit_state: self.breaker.state(),
            pool_size: pool.as_ref().map(|p| p.size()).unwrap_or(0),
            pool_idle: pool.as_ref().map(|p| p.idle()).unwrap_or(0),
            missing_tables: self.missing_tables.lock().clone(),
            metrics: self.metrics(),
        }
    }
}
