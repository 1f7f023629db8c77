//! # Circuit Breaker Implementation
//!
//! Three-state protective wrapper around a fallible call: Closed (normal
//! operation), Open (failing fast) and Half-Open (probing recovery).
//!
//! All counters and the state live behind one lock so every transition is
//! applied atomically with respect to concurrent callers. Time is read from
//! [`tokio::time::Instant`] so the reset timeout follows a paused test clock.
//!
//! A half-open call whose future is dropped before it finishes reopens the
//! circuit, so an abandoned call never holds its slot.

use crate::events::{EventPublisher, SubstrateEvent};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - a bounded number of probes are allowed through
    HalfOpen,
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the protected call was not invoked
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation ran and failed; the failure was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    half_open_calls: u32,
    /// Bumped on every entry into half-open
    half_open_epoch: u64,
    last_failure_at: Option<Instant>,
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    rejected_count: u64,
    total_duration: Duration,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            half_open_calls: 0,
            half_open_epoch: 0,
            last_failure_at: None,
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
            total_duration: Duration::ZERO,
        }
    }

    fn reset_timeout_elapsed(&self, reset_timeout: Duration) -> bool {
        match self.last_failure_at {
            Some(at) => at.elapsed() >= reset_timeout,
            None => true,
        }
    }
}

/// Admitted call; `half_open_epoch` is set for half-open calls
#[derive(Debug, Clone, Copy)]
struct Admission {
    half_open_epoch: Option<u64>,
}

/// Reopens the circuit if a half-open call is dropped before completing
struct HalfOpenGuard<'a> {
    breaker: &'a CircuitBreaker,
    epoch: Option<u64>,
}

impl HalfOpenGuard<'_> {
    fn disarm(mut self) {
        self.epoch = None;
    }
}

impl Drop for HalfOpenGuard<'_> {
    fn drop(&mut self) {
        if let Some(epoch) = self.epoch.take() {
            self.breaker.abandon_half_open_call(epoch);
        }
    }
}

/// Circuit breaker guarding one named resource
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    events: Option<EventPublisher>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            success_threshold = config.success_threshold,
            half_open_max_calls = config.half_open_max_calls,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState::new()),
            events: None,
        }
    }

    /// Publish state transitions on the given channel
    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(admission) = self.admit() else {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        };
        let guard = HalfOpenGuard {
            breaker: self,
            epoch: admission.half_open_epoch,
        };

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();
        guard.disarm();

        match &result {
            Ok(_) => self.on_success(duration),
            Err(_) => self.on_failure(duration),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Admission decision for one call.
    ///
    /// An open circuit whose reset timeout has elapsed moves to half-open and
    /// admits this call as the first probe.
    pub fn allow_request(&self) -> bool {
        self.admit().is_some()
    }

    fn admit(&self) -> Option<Admission> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Some(Admission { half_open_epoch: None }),
            CircuitState::Open => {
                if inner.reset_timeout_elapsed(self.config.reset_timeout) {
                    self.enter_half_open(&mut inner);
                    inner.half_open_calls = 1;
                    let epoch = inner.half_open_epoch;
                    drop(inner);
                    self.publish(SubstrateEvent::CircuitHalfOpened {
                        component: self.name.clone(),
                    });
                    Some(Admission {
                        half_open_epoch: Some(epoch),
                    })
                } else {
                    inner.rejected_count += 1;
                    debug!(component = %self.name, "⛔ Call rejected (circuit open)");
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    Some(Admission {
                        half_open_epoch: Some(inner.half_open_epoch),
                    })
                } else {
                    inner.rejected_count += 1;
                    debug!(component = %self.name, "⛔ Call rejected (half-open probe limit)");
                    None
                }
            }
        }
    }

    /// A call admitted in half-open `epoch` was dropped without an outcome
    fn abandon_half_open_call(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::HalfOpen || inner.half_open_epoch != epoch {
            return;
        }
        warn!(component = %self.name, "⚠️ Half-open call abandoned before completing");
        let failures = inner.consecutive_failures;
        self.enter_open(&mut inner);
        drop(inner);
        self.publish(SubstrateEvent::CircuitOpened {
            component: self.name.clone(),
            consecutive_failures: failures,
        });
    }

    /// Record a success observed outside [`CircuitBreaker::call`]
    pub fn record_success(&self) {
        self.on_success(Duration::ZERO);
    }

    /// Record a failure observed outside [`CircuitBreaker::call`]
    pub fn record_failure(&self) {
        self.on_failure(Duration::ZERO);
    }

    /// Out-of-band recovery trigger.
    ///
    /// Moves an open circuit to half-open when the reset timeout has elapsed
    /// since the last failure, without consuming a probe. Returns whether the
    /// transition happened.
    pub fn attempt_reset(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open
            || !inner.reset_timeout_elapsed(self.config.reset_timeout)
        {
            return false;
        }
        self.enter_half_open(&mut inner);
        drop(inner);
        self.publish(SubstrateEvent::CircuitHalfOpened {
            component: self.name.clone(),
        });
        true
    }

    fn on_success(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.success_count += 1;
        inner.total_duration += duration;
        inner.consecutive_failures = 0;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🟢 Operation succeeded"
        );

        match inner.state {
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    self.enter_closed(&mut inner);
                    drop(inner);
                    self.publish(SubstrateEvent::CircuitClosed {
                        component: self.name.clone(),
                    });
                }
            }
            CircuitState::Closed => {}
            CircuitState::Open => {
                debug!(component = %self.name, "Late success recorded while circuit is open");
            }
        }
    }

    fn on_failure(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.failure_count += 1;
        inner.total_duration += duration;
        inner.consecutive_successes = 0;

        warn!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🔴 Operation failed"
        );

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                inner.last_failure_at = Some(Instant::now());
                if inner.consecutive_failures >= self.config.failure_threshold {
                    let failures = inner.consecutive_failures;
                    self.enter_open(&mut inner);
                    drop(inner);
                    self.publish(SubstrateEvent::CircuitOpened {
                        component: self.name.clone(),
                        consecutive_failures: failures,
                    });
                }
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures += 1;
                let failures = inner.consecutive_failures;
                self.enter_open(&mut inner);
                drop(inner);
                self.publish(SubstrateEvent::CircuitOpened {
                    component: self.name.clone(),
                    consecutive_failures: failures,
                });
            }
            CircuitState::Open => {}
        }
    }

    fn enter_closed(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.half_open_calls = 0;
        inner.last_failure_at = None;

        info!(
            component = %self.name,
            total_calls = inner.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );
    }

    fn enter_open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.consecutive_successes = 0;
        inner.half_open_calls = 0;
        inner.last_failure_at = Some(Instant::now());

        error!(
            component = %self.name,
            consecutive_failures = inner.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    fn enter_half_open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::HalfOpen;
        inner.consecutive_successes = 0;
        inner.half_open_calls = 0;
        inner.half_open_epoch += 1;

        info!(
            component = %self.name,
            success_threshold = self.config.success_threshold,
            "🟡 Circuit breaker half-open (testing recovery)"
        );
    }

    fn publish(&self, event: SubstrateEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock();
        self.enter_open(&mut inner);
        let failures = inner.consecutive_failures;
        drop(inner);
        self.publish(SubstrateEvent::CircuitOpened {
            component: self.name.clone(),
            consecutive_failures: failures,
        });
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        self.enter_closed(&mut inner);
        drop(inner);
        self.publish(SubstrateEvent::CircuitClosed {
            component: self.name.clone(),
        });
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        let mut snapshot = CircuitBreakerMetrics {
            total_calls: inner.total_calls,
            success_count: inner.success_count,
            failure_count: inner.failure_count,
            rejected_count: inner.rejected_count,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            half_open_calls: inner.half_open_calls,
            total_duration: inner.total_duration,
            current_state: inner.state,
            ..CircuitBreakerMetrics::new()
        };

        if inner.total_calls > 0 {
            snapshot.failure_rate = inner.failure_count as f64 / inner.total_calls as f64;
            snapshot.success_rate = inner.success_count as f64 / inner.total_calls as f64;
            snapshot.average_duration =
                Duration::from_nanos((inner.total_duration.as_nanos() / u128::from(inner.total_calls)) as u64);
        }

        snapshot
    }

    /// Closed with a low failure rate
    pub fn is_healthy(&self) -> bool {
        let inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            return false;
        }
        if inner.total_calls < 10 {
            return true;
        }
        (inner.failure_count as f64 / inner.total_calls as f64) < 0.1
    }
}
