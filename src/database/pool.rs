//! # Datastore Pool Abstractions
//!
//! The datastore engine is an external collaborator reached through these
//! traits. [`crate::database::postgres`] provides the PostgreSQL
//! implementation; tests substitute in-memory pools.

use super::DatastoreError;
use crate::config::DatabaseConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A result row keyed by column name
pub type Row = serde_json::Map<String, Value>;

/// Opens a pool for the given settings
#[async_trait]
pub trait DatastoreConnector: Send + Sync {
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn DatastorePool>, DatastoreError>;
}

/// A pool of datastore connections
#[async_trait]
pub trait DatastorePool: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn DatastoreConnection>, DatastoreError>;

    /// Release every connection; must be idempotent
    async fn close(&self);

    /// Connections currently open
    fn size(&self) -> u32;

    /// Open connections not checked out
    fn idle(&self) -> usize;
}

/// A checked-out connection, returned to the pool on drop
#[async_trait]
pub trait DatastoreConnection: Send {
    async fn execute(&mut self, query: &str, params: &[Value]) -> Result<Vec<Row>, DatastoreError>;
}

/// Resolved connection parameters
#[derive(Clone)]
pub struct ConnectionSettings {
    /// Full connection string; takes precedence over the discrete fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
    pub ssl: bool,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl ConnectionSettings {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            ssl: config.ssl,
            min_connections: config.min_connections,
            max_connections: config.max_connections,
            acquire_timeout: config.connection_timeout(),
        }
    }

    /// Where the pool points, without credentials
    pub fn target(&self) -> String {
        match &self.url {
            Some(url) => redact_url(url),
            None => format!("{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("target", &self.target())
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("ssl", &self.ssl)
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// Strip the userinfo part of a connection string
fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return "[REDACTED]".to_string();
    };
    let rest = &url[scheme_end + 3..];
    match rest.rfind('@') {
        Some(at) => format!("{}://[REDACTED]@{}", &url[..scheme_end], &rest[at + 1..]),
        None => url.to_string(),
    }
}
