//! # Substrate Configuration
//!
//! Configuration tree for every substrate component. Values are layered by
//! [`ConfigManager`]: built-in defaults, optional YAML files, `SUBSTRATE__*`
//! environment variables and finally the conventional datastore variables
//! (`DATABASE_URL`, `DB_HOST`, ...).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use substrate_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let query_timeout = manager.config().database.query_timeout();
//! let max_tasks = manager.config().scheduler.max_concurrent_tasks;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::fault::FaultKind;
use crate::resilience::CircuitBreakerConfig as ResilienceBreakerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SubstrateConfig {
    /// Datastore connection, pooling and timeouts
    pub database: DatabaseConfig,

    /// Circuit breaker thresholds
    pub circuit_breakers: CircuitBreakersConfig,

    /// Task scheduler admission limits
    pub scheduler: SchedulerConfig,

    /// Service bootstrap retry policy
    pub bootstrap: BootstrapConfig,

    /// Fault boundary classification and history
    pub fault_boundary: FaultBoundaryConfig,

    /// Notification channel sizing
    pub events: EventsConfig,

    /// Structured logging output
    pub logging: LoggingConfig,
}

impl SubstrateConfig {
    /// Validate cross-field constraints of every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.database.validate()?;
        self.circuit_breakers.validate()?;
        self.scheduler.validate()?;
        self.bootstrap.validate()?;
        self.fault_boundary.validate()?;
        Ok(())
    }
}

/// Datastore connection and pooling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
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
    /// Bound on waiting for a pooled connection
    pub connection_timeout_ms: u64,
    /// Bound on a single query execution
    pub query_timeout_ms: u64,
    pub health_check_interval_ms: u64,
    /// Attempts used to attest connectivity during initialization
    pub connect_attempts: u32,
    /// Base delay for the exponential connect backoff
    pub retry_base_delay_ms: u64,
    /// Tables whose presence is checked (best effort) after connecting
    pub required_tables: Vec<String>,
    /// Whether bootstrap must abort when the datastore cannot start
    pub critical: bool,
}

impl DatabaseConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.url.is_none() && self.host.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "host",
                "database (no url provided)",
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "pool must allow at least one connection",
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigurationError::invalid_value(
                "database.min_connections",
                self.min_connections.to_string(),
                format!("must not exceed max_connections ({})", self.max_connections),
            ));
        }
        if self.connect_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.connect_attempts",
                "0",
                "at least one connection attempt is required",
            ));
        }
        if self.query_timeout_ms == 0 || self.connection_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.query_timeout_ms",
                self.query_timeout_ms.to_string(),
                "timeouts must be greater than 0",
            ));
        }
        if self.health_check_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.health_check_interval_ms",
                "0",
                "health check interval must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "substrate".to_string(),
            username: "postgres".to_string(),
            password: None,
            ssl: false,
            min_connections: 2,
            max_connections: 10,
            connection_timeout_ms: 5_000,
            query_timeout_ms: 30_000,
            health_check_interval_ms: 30_000,
            connect_attempts: 3,
            retry_base_delay_ms: 1_000,
            required_tables: Vec::new(),
            critical: true,
        }
    }
}

/// Circuit breaker configuration for all protected components
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakersConfig {
    pub enabled: bool,
    /// Upper bound on distinct named breakers in the registry
    pub max_circuit_breakers: usize,
    /// Settings for components without an explicit override
    pub default_config: CircuitBreakerComponentConfig,
    /// Per-component overrides keyed by component name
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

/// Thresholds for a single breaker
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub success_threshold: u32,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            success_threshold: 2,
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerComponentConfig {
    pub fn to_resilience_config(&self) -> ResilienceBreakerConfig {
        ResilienceBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
            success_threshold: self.success_threshold,
            half_open_max_calls: self.half_open_max_calls,
        }
    }
}

impl CircuitBreakersConfig {
    /// Resolve the effective settings for a component
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerComponentConfig {
        self.component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_circuit_breakers == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breakers.max_circuit_breakers",
                "0",
                "must be greater than 0",
            ));
        }
        let named = std::iter::once(("default", &self.default_config)).chain(
            self.component_configs
                .iter()
                .map(|(name, config)| (name.as_str(), config)),
        );
        for (name, component) in named {
            component.to_resilience_config().validate().map_err(|reason| {
                ConfigurationError::invalid_value(
                    format!("circuit_breakers.{name}"),
                    format!("{component:?}"),
                    reason,
                )
            })?;
        }
        Ok(())
    }
}

impl Default for CircuitBreakersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_circuit_breakers: 50,
            default_config: CircuitBreakerComponentConfig::default(),
            component_configs: HashMap::new(),
        }
    }
}

/// Task scheduler admission control
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_concurrent_tasks: usize,
    /// Ceiling on tasks waiting in all priority buckets combined
    pub max_queue_size: usize,
    pub default_timeout_ms: u64,
    pub default_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Upper bound for a task's declared memory ceiling
    pub max_task_memory_bytes: u64,
    /// Sum of declared ceilings allowed to run at once
    pub max_total_memory_bytes: u64,
    pub shutdown_grace_ms: u64,
}

impl SchedulerConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_concurrent_tasks",
                "0",
                "at least one task must be allowed to run",
            ));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_queue_size",
                "0",
                "queue must hold at least one task",
            ));
        }
        if self.max_task_memory_bytes > self.max_total_memory_bytes {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_task_memory_bytes",
                self.max_task_memory_bytes.to_string(),
                format!(
                    "must not exceed max_total_memory_bytes ({})",
                    self.max_total_memory_bytes
                ),
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 5,
            max_queue_size: 1_000,
            default_timeout_ms: 300_000,
            default_retry_attempts: 3,
            retry_base_delay_ms: 1_000,
            max_task_memory_bytes: 512 * 1024 * 1024,
            max_total_memory_bytes: 2 * 1024 * 1024 * 1024,
            shutdown_grace_ms: 30_000,
        }
    }
}

/// Service bootstrap retry policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub service_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub default_service_timeout_ms: u64,
}

impl BootstrapConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn default_service_timeout(&self) -> Duration {
        Duration::from_millis(self.default_service_timeout_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.service_retry_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "bootstrap.service_retry_attempts",
                "0",
                "each service needs at least one attempt",
            ));
        }
        Ok(())
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            service_retry_attempts: 3,
            retry_base_delay_ms: 1_000,
            default_service_timeout_ms: 30_000,
        }
    }
}

/// Fault boundary classification and retention
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FaultBoundaryConfig {
    /// Fault kinds treated as recoverable warnings
    pub known_safe: Vec<FaultKind>,
    /// Ring buffer capacity for captured faults
    pub history_capacity: usize,
    /// Time given to in-flight work before a fatal fault terminates the process
    pub fatal_grace_period_ms: u64,
}

impl FaultBoundaryConfig {
    pub fn fatal_grace_period(&self) -> Duration {
        Duration::from_millis(self.fatal_grace_period_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.history_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "fault_boundary.history_capacity",
                "0",
                "history must retain at least one record",
            ));
        }
        Ok(())
    }
}

impl Default for FaultBoundaryConfig {
    fn default() -> Self {
        Self {
            known_safe: vec![FaultKind::TransientAuth, FaultKind::MissingOptionalField],
            history_capacity: 100,
            fatal_grace_period_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_000,
        }
    }
}

/// Structured logging output
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; falls back to `RUST_LOG`, then an environment default
    pub level: Option<String>,
    /// Emit JSON on the console instead of human-readable lines
    pub json: bool,
    /// Directory for an additional JSON log file
    pub directory: Option<PathBuf>,
}
