//! Shared fixtures for integration tests: an in-memory datastore, a
//! terminator that records instead of exiting and tuned configurations.
#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use substrate_core::config::SubstrateConfig;
use substrate_core::database::{
    ConnectionSettings, DatastoreConnection, DatastoreConnector, DatastoreError, DatastorePool, Row,
};
use substrate_core::fault::ProcessTerminator;

/// In-memory datastore whose availability can be toggled
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    pub refuse_connections: AtomicBool,
    pub fail_queries: AtomicBool,
    /// Queries hang until the caller gives up
    pub stall_queries: AtomicBool,
    pub connects: AtomicU32,
    pub queries: AtomicU32,
    pub closed: AtomicBool,
}

impl MemoryDatastore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_available(&self, available: bool) {
        self.refuse_connections.store(!available, Ordering::SeqCst);
        self.fail_queries.store(!available, Ordering::SeqCst);
    }

    pub fn connector(self: &Arc<Self>) -> Arc<dyn DatastoreConnector> {
        Arc::new(MemoryConnector(Arc::clone(self)))
    }
}

struct MemoryConnector(Arc<MemoryDatastore>);

#[async_trait]
impl DatastoreConnector for MemoryConnector {
    async fn connect(&self, _settings: &ConnectionSettings) -> Result<Arc<dyn DatastorePool>, DatastoreError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        if self.0.refuse_connections.load(Ordering::SeqCst) {
            return Err(DatastoreError::Connection("connection refused".to_string()));
        }
        Ok(Arc::new(MemoryPool(Arc::clone(&self.0))))
    }
}

struct MemoryPool(Arc<MemoryDatastore>);

#[async_trait]
impl DatastorePool for MemoryPool {
    async fn acquire(&self) -> Result<Box<dyn DatastoreConnection>, DatastoreError> {
        Ok(Box::new(MemoryConnection(Arc::clone(&self.0))))
    }

    async fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }

    fn size(&self) -> u32 {
        2
    }

    fn idle(&self) -> usize {
        2
    }
}

struct MemoryConnection(Arc<MemoryDatastore>);

#[async_trait]
impl DatastoreConnection for MemoryConnection {
    async fn execute(&mut self, query: &str, params: &[Value]) -> Result<Vec<Row>, DatastoreError> {
        self.0.queries.fetch_add(1, Ordering::SeqCst);
        if self.0.stall_queries.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.0.fail_queries.load(Ordering::SeqCst) {
            return Err(DatastoreError::Query("server closed the connection".to_string()));
        }

        let mut row = Row::new();
        row.insert("query".to_string(), Value::from(query));
        row.insert("params".to_string(), Value::from(params.to_vec()));
        row.insert("health".to_string(), Value::from(1));
        row.insert("present".to_string(), Value::Bool(true));
        Ok(vec![row])
    }
}

/// Records exit codes instead of ending the test process
#[derive(Debug, Default)]
pub struct RecordingTerminator {
    pub exit_codes: Mutex<Vec<i32>>,
}

impl RecordingTerminator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn exit_codes(&self) -> Vec<i32> {
        self.exit_codes.lock().clone()
    }
}

impl ProcessTerminator for RecordingTerminator {
    fn terminate(&self, exit_code: i32) {
        self.exit_codes.lock().push(exit_code);
    }
}

/// Configuration with short delays suited to a paused clock
pub fn test_config() -> SubstrateConfig {
    let mut config = SubstrateConfig::default();
    config.database.retry_base_delay_ms = 10;
    config.database.health_check_interval_ms = 60_000;
    config.bootstrap.retry_base_delay_ms = 10;
    config.scheduler.retry_base_delay_ms = 10;
    config.scheduler.max_concurrent_tasks = 2;
    config.scheduler.shutdown_grace_ms = 1_000;
    config.fault_boundary.fatal_grace_period_ms = 100;
    config
}
