//! # System Constants
//!
//! Well-known names shared by the bootstrap, the circuit breaker registry and
//! the notification stream.

/// Names of the services the substrate registers with its own bootstrap
pub mod services {
    pub const FAULT_BOUNDARY: &str = "fault_boundary";
    pub const RESOURCE_MONITOR: &str = "resource_monitor";
    pub const CIRCUIT_BREAKERS: &str = "circuit_breakers";
    pub const DATASTORE: &str = "datastore";
    pub const TASK_SCHEDULER: &str = "task_scheduler";
}

/// Circuit breaker component names
pub mod components {
    pub const DATASTORE: &str = "datastore";
}

/// Notification names, as emitted on the event stream
pub mod events {
    pub const SERVICE_READY: &str = "service.ready";
    pub const SERVICE_DEGRADED: &str = "service.degraded";
    pub const SERVICE_FAILED: &str = "service.failed";

    pub const TASK_QUEUED: &str = "task.queued";
    pub const TASK_STARTED: &str = "task.started";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_RETRYING: &str = "task.retrying";
    pub const TASK_CANCELLED: &str = "task.cancelled";

    pub const CIRCUIT_OPENED: &str = "circuit.opened";
    pub const CIRCUIT_HALF_OPENED: &str = "circuit.half_opened";
    pub const CIRCUIT_CLOSED: &str = "circuit.closed";

    pub const MEMORY_PRESSURE: &str = "memory.pressure";
    pub const MEMORY_PRESSURE_CLEARED: &str = "memory.pressure_cleared";

    pub const BOOTSTRAP_COMPLETE: &str = "bootstrap.complete";
    pub const BOOTSTRAP_FAILED: &str = "bootstrap.failed";

    pub const FAULT_CAPTURED: &str = "fault.captured";
}

/// Process-level defaults
pub mod system {
    /// Fixed number of attempts used to attest datastore connectivity
    pub const DATASTORE_CONNECT_ATTEMPTS: u32 = 3;
    /// Window of recent samples kept for rolling averages
    pub const ROLLING_WINDOW: usize = 100;
    /// Exit status used for fatal faults
    pub const FATAL_EXIT_CODE: i32 = 1;
}
