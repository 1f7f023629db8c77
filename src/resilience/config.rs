//! # Circuit Breaker Configuration
//!
//! Runtime thresholds for a single breaker. The serde-facing counterpart with
//! millisecond fields lives in [`crate::config::CircuitBreakerComponentConfig`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time since the last failure before an open circuit admits a probe
    pub reset_timeout: Duration,

    /// Number of successful probes in half-open state to close circuit
    pub success_threshold: u32,

    /// Probes admitted while half-open
    pub half_open_max_calls: u32,
}

impl CircuitBreakerConfig {
    /// Create configuration for the shared datastore
    pub fn for_datastore() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
            half_open_max_calls: 3,
        }
    }

    /// Create configuration for external API calls
    pub fn for_external_api() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(45),
            success_threshold: 2,
            half_open_max_calls: 2,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.reset_timeout.is_zero() {
            return Err("reset_timeout must be greater than 0".to_string());
        }

        if self.reset_timeout > Duration::from_secs(300) {
            return Err("reset_timeout should not exceed 300 seconds".to_string());
        }

        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".to_string());
        }

        if self.half_open_max_calls < self.success_threshold {
            return Err(format!(
                "half_open_max_calls ({}) must be at least success_threshold ({})",
                self.half_open_max_calls, self.success_threshold
            ));
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::for_datastore()
    }
}
