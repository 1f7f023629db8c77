//! # Resilience Module
//!
//! Fault isolation primitives: a generic three-state circuit breaker, a
//! registry of named breakers and the exponential backoff used by every retry
//! loop in the substrate.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use substrate_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let circuit_breaker = CircuitBreaker::new("datastore", CircuitBreakerConfig::for_datastore());
//!
//! let result = circuit_breaker
//!     .call(|| async { Ok::<&str, std::io::Error>("success") })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;

pub use backoff::exponential_delay;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::CircuitBreakerConfig;
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
