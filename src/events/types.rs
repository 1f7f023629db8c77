use crate::constants::events;
use crate::fault::{FaultCategory, FaultSeverity};
use serde::{Deserialize, Serialize};

/// Lifecycle notifications emitted by the substrate components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SubstrateEvent {
    ServiceReady { service: String },
    ServiceDegraded { service: String, error: String },
    ServiceFailed { service: String, error: String },

    TaskQueued { task_id: String },
    TaskStarted { task_id: String, attempt: u32 },
    TaskCompleted { task_id: String, duration_ms: u64 },
    TaskFailed { task_id: String, attempts: u32, error: String },
    TaskRetrying { task_id: String, attempt: u32, delay_ms: u64, error: String },
    TaskCancelled { task_id: String },

    CircuitOpened { component: String, consecutive_failures: u32 },
    CircuitHalfOpened { component: String },
    CircuitClosed { component: String },

    MemoryPressure,
    MemoryPressureCleared,

    BootstrapComplete { services: usize, elapsed_ms: u64 },
    BootstrapFailed { error: String },

    FaultCaptured { severity: FaultSeverity, category: FaultCategory, message: String },
}

impl SubstrateEvent {
    /// Dotted notification name
    pub fn name(&self) -> &'static str {
        match self {
            SubstrateEvent::ServiceReady { .. } => events::SERVICE_READY,
            SubstrateEvent::ServiceDegraded { .. } => events::SERVICE_DEGRADED,
            SubstrateEvent::ServiceFailed { .. } => events::SERVICE_FAILED,
            SubstrateEvent::TaskQueued { .. } => events::TASK_QUEUED,
            SubstrateEvent::TaskStarted { .. } => events::TASK_STARTED,
            SubstrateEvent::TaskCompleted { .. } => events::TASK_COMPLETED,
            SubstrateEvent::TaskFailed { .. } => events::TASK_FAILED,
            SubstrateEvent::TaskRetrying { .. } => events::TASK_RETRYING,
            SubstrateEvent::TaskCancelled { .. } => events::TASK_CANCELLED,
            SubstrateEvent::CircuitOpened { .. } => events::CIRCUIT_OPENED,
            SubstrateEvent::CircuitHalfOpened { .. } => events::CIRCUIT_HALF_OPENED,
            SubstrateEvent::CircuitClosed { .. } => events::CIRCUIT_CLOSED,
            SubstrateEvent::MemoryPressure => events::MEMORY_PRESSURE,
            SubstrateEvent::MemoryPressureCleared => events::MEMORY_PRESSURE_CLEARED,
            SubstrateEvent::BootstrapComplete { .. } => events::BOOTSTRAP_COMPLETE,
            SubstrateEvent::BootstrapFailed { .. } => events::BOOTSTRAP_FAILED,
            SubstrateEvent::FaultCaptured { .. } => events::FAULT_CAPTURED,
        }
    }
}
