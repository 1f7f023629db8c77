//! # Guarded Datastore Access
//!
//! Fault-isolated access to the shared external datastore.
//!
//! ## Key Components
//!
//! - [`pool`] - connector, pool and connection traits plus resolved connection settings
//! - [`postgres`] - SQLx PostgreSQL implementation of the pool traits
//! - [`manager`] - [`GuardedDatastore`]: circuit breaker, timeouts, retries and health checks
//! - [`metrics`] - query counters with a rolling latency window
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use substrate_core::config::DatabaseConfig;
//! use substrate_core::database::{GuardedDatastore, PgConnector};
//! use substrate_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = Arc::new(CircuitBreaker::new("datastore", CircuitBreakerConfig::for_datastore()));
//! let datastore = Arc::new(GuardedDatastore::new(
//!     DatabaseConfig::default(),
//!     Arc::new(PgConnector),
//!     breaker,
//! ));
//!
//! datastore.initialize().await?;
//! let rows = datastore.query("SELECT $1::text AS greeting", &["hello".into()]).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod manager;
pub mod metrics;
pub mod pool;
pub mod postgres;

pub use error::DatastoreError;
pub use manager::{DatastoreStatus, GuardedDatastore};
pub use metrics::{QueryMetrics, QueryStats};
pub use pool::{ConnectionSettings, DatastoreConnection, DatastoreConnector, DatastorePool, Row};
pub use postgres::{PgConnector, PgDatastorePool};
