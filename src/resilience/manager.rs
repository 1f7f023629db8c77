//! # Circuit Breaker Manager
//!
//! Registry of independent, named circuit breakers with centralized control
//! and metrics aggregation.

use crate::config::{CircuitBreakerComponentConfig, CircuitBreakersConfig};
use crate::events::EventPublisher;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerMetrics, CircuitState, SystemCircuitBreakerMetrics,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Manager for multiple circuit breakers across system components
#[derive(Debug, Clone)]
pub struct CircuitBreakerManager {
    circuit_breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
    config: Arc<RwLock<CircuitBreakersConfig>>,
    events: Option<EventPublisher>,
}

impl CircuitBreakerManager {
    pub fn from_config(config: &CircuitBreakersConfig) -> Self {
        info!(
            enabled = config.enabled,
            max_circuit_breakers = config.max_circuit_breakers,
            "🛡️ Initializing circuit breaker manager"
        );

        Self {
            circuit_breakers: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(RwLock::new(config.clone())),
            events: None,
        }
    }

    /// Breakers created from now on publish their transitions here
    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    /// Get or create the circuit breaker for a component
    pub fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.circuit_breakers.read().get(component_name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.circuit_breakers.write();

        // Another caller may have created it between the two locks
        if let Some(breaker) = breakers.get(component_name) {
            return Arc::clone(breaker);
        }

        let config = self.config.read();
        if breakers.len() >= config.max_circuit_breakers {
            warn!(
                component = component_name,
                current_count = breakers.len(),
                max_allowed = config.max_circuit_breakers,
                "🚨 Maximum circuit breaker limit reached"
            );
        }

        let component_config = config.config_for_component(component_name).to_resilience_config();
        drop(config);

        let mut breaker = CircuitBreaker::new(component_name, component_config);
        if let Some(events) = &self.events {
            breaker = breaker.with_events(events.clone());
        }
        let breaker = Arc::new(breaker);

        breakers.insert(component_name.to_string(), Arc::clone(&breaker));

        info!(
            component = component_name,
            total_circuit_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        breaker
    }

    pub fn list_components(&self) -> Vec<String> {
        self.circuit_breakers.read().keys().cloned().collect()
    }

    pub fn component_metrics(&self, component_name: &str) -> Option<CircuitBreakerMetrics> {
        self.circuit_breakers
            .read()
            .get(component_name)
            .map(|breaker| breaker.metrics())
    }

    pub fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for (name, breaker) in self.circuit_breakers.read().iter() {
            system_metrics.add_circuit_breaker(name.clone(), breaker.metrics());
        }
        system_metrics
    }

    /// Force open all circuit breakers (emergency stop)
    pub fn force_open_all(&self) {
        warn!("🚨 Forcing all circuit breakers open (emergency stop)");
        for breaker in self.circuit_breakers.read().values() {
            breaker.force_open();
        }
    }

    /// Force close all circuit breakers (emergency recovery)
    pub fn force_close_all(&self) {
        warn!("🚨 Forcing all circuit breakers closed (emergency recovery)");
        for breaker in self.circuit_breakers.read().values() {
            breaker.force_closed();
        }
    }

    pub fn remove_circuit_breaker(&self, component_name: &str) -> bool {
        let mut breakers = self.circuit_breakers.write();
        if breakers.remove(component_name).is_some() {
            info!(
                component = component_name,
                remaining_count = breakers.len(),
                "🗑️ Removed circuit breaker"
            );
            true
        } else {
            false
        }
    }

    pub fn state_summary(&self) -> HashMap<CircuitState, usize> {
        self.system_metrics().count_by_state()
    }

    pub fn system_health_score(&self) -> f64 {
        self.system_metrics().health_score()
    }

    /// Update configuration for a component; applies to breakers created afterwards
    pub fn update_component_config(&self, component_name: &str, config: CircuitBreakerComponentConfig) {
        self.config
            .write()
            .component_configs
            .insert(component_name.to_string(), config);

        info!(
            component = component_name,
            "⚙️ Updated circuit breaker configuration (applies to new instances)"
        );
    }
}
