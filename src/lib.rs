#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Substrate Core
//!
//! Resilient service-orchestration substrate for long-running backend
//! processes.
//!
//! ## Overview
//!
//! The substrate brings a process up in dependency order, keeps its shared
//! datastore behind a circuit breaker, runs background work through a priority
//! scheduler with admission control, and routes every fault that escapes
//! component error handling to one boundary that classifies it and decides
//! between logging, recovery and process exit.
//!
//! ## Module Organization
//!
//! - [`fault`] - Fault boundary: classification, history, recovery routing
//! - [`resilience`] - Circuit breaker primitive, registry and backoff
//! - [`database`] - Guarded datastore access over a pluggable pool
//! - [`scheduler`] - Resource-aware priority task scheduler
//! - [`telemetry`] - Memory-pressure signals from an external collaborator
//! - [`orchestration`] - Dependency-ordered bootstrap and the [`SubstrateCore`] root
//! - [`config`] - Layered configuration
//! - [`events`] - Typed lifecycle notifications
//! - [`logging`] - Structured logging initialisation
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use substrate_core::config::ConfigManager;
//! use substrate_core::orchestration::SubstrateCore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config_manager = ConfigManager::load()?;
//! let core = SubstrateCore::from_config_manager(&config_manager)?;
//!
//! if let Some(report) = core.run().await {
//!     println!("started {:?}", report.order);
//! }
//!
//! core.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod fault;
pub mod logging;
pub mod orchestration;
pub mod resilience;
pub mod scheduler;
pub mod telemetry;

pub use config::{ConfigManager, SubstrateConfig};
pub use error::{Result, SubstrateError};
pub use events::{EventPublisher, SubstrateEvent};
pub use fault::{Fault, FaultBoundary, FaultCategory, FaultOrigin, FaultSeverity};
pub use orchestration::{ServiceBootstrap, ServiceOptions, ServiceStatus, SubstrateCore};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use scheduler::{TaskOptions, TaskPriority, TaskScheduler};
