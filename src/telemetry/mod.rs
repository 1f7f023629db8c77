//! # Memory Telemetry Integration
//!
//! The memory-telemetry subsystem is an external collaborator. It is reached
//! through [`MemoryTelemetry`], which supplies heap/RSS snapshots and a stream
//! of warning/critical signals. [`MemoryPressureMonitor`] forwards those
//! signals to a [`MemoryPressureListener`] (the task scheduler).

use crate::events::{EventPublisher, SubstrateEvent};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Memory level reported by telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySignal {
    Normal,
    Warning,
    Critical,
}

/// Heap and resident-set usage at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub heap_used_bytes: u64,
    pub heap_total_bytes: u64,
    pub rss_bytes: u64,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl MemorySnapshot {
    pub fn new(heap_used_bytes: u64, heap_total_bytes: u64, rss_bytes: u64) -> Self {
        Self {
            heap_used_bytes,
            heap_total_bytes,
            rss_bytes,
            captured_at: chrono::Utc::now(),
        }
    }

    /// Used fraction of the heap, 0.0 when the total is unknown
    pub fn heap_usage_ratio(&self) -> f64 {
        if self.heap_total_bytes == 0 {
            return 0.0;
        }
        self.heap_used_bytes as f64 / self.heap_total_bytes as f64
    }
}

impl Default for MemorySnapshot {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Source of memory snapshots and pressure signals
pub trait MemoryTelemetry: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<MemorySignal>;

    fn snapshot(&self) -> MemorySnapshot;
}

/// Reacts to pressure transitions
pub trait MemoryPressureListener: Send + Sync {
    fn on_memory_pressure(&self);

    fn on_memory_pressure_cleared(&self);
}

/// Telemetry fed by an embedding process through [`ChannelMemoryTelemetry::publish`]
#[derive(Debug)]
pub struct ChannelMemoryTelemetry {
    sender: broadcast::Sender<MemorySignal>,
    latest: RwLock<MemorySnapshot>,
}

impl ChannelMemoryTelemetry {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            latest: RwLock::new(MemorySnapshot::default()),
        }
    }

    pub fn publish(&self, signal: MemorySignal) {
        // No subscribers yet is fine
        let _ = self.sender.send(signal);
    }

    pub fn update_snapshot(&self, snapshot: MemorySnapshot) {
        *self.latest.write() = snapshot;
    }
}

impl Default for ChannelMemoryTelemetry {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MemoryTelemetry for ChannelMemoryTelemetry {
    fn subscribe(&self) -> broadcast::Receiver<MemorySignal> {
        self.sender.subscribe()
    }

    fn snapshot(&self) -> MemorySnapshot {
        self.latest.read().clone()
    }
}

/// Forwards telemetry signals to a pressure listener
pub struct MemoryPressureMonitor {
    telemetry: Arc<dyn MemoryTelemetry>,
    events: Option<EventPublisher>,
    under_pressure: AtomicBool,
    shutdown_token: CancellationToken,
}

impl std::fmt::Debug for MemoryPressureMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPressureMonitor")
            .field("under_pressure", &self.is_under_pressure())
            .field("stopped", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl MemoryPressureMonitor {
    pub fn new(telemetry: Arc<dyn MemoryTelemetry>) -> Self {
        Self {
            telemetry,
            events: None,
            under_pressure: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_under_pressure(&self) -> bool {
        self.under_pressure.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        self.telemetry.snapshot()
    }

    /// Subscribe now so signals published before the loop is polled are kept
    pub fn subscribe(&self) -> broadcast::Receiver<MemorySignal> {
        self.telemetry.subscribe()
    }

    /// Forward signals until [`MemoryPressureMonitor::stop`] or the telemetry
    /// channel closes
    pub async fn run(
        &self,
        mut signals: broadcast::Receiver<MemorySignal>,
        listener: Arc<dyn MemoryPressureListener>,
    ) {
        info!("📊 MEMORY MONITOR: Forwarding telemetry signals");
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => break,
                received = signals.recv() => match received {
                    Ok(signal) => self.handle_signal(signal, listener.as_ref()),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed = missed, "Memory signal receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Telemetry channel closed");
                        break;
                    }
                },
            }
        }
        info!("📊 MEMORY MONITOR: Stopped");
    }

    /// Apply one signal; only transitions reach the listener
    pub fn handle_signal(&self, signal: MemorySignal, listener: &dyn MemoryPressureListener) {
        match signal {
            MemorySignal::Critical => {
                if !self.under_pressure.swap(true, Ordering::AcqRel) {
                    let snapshot = self.telemetry.snapshot();
                    warn!(
                        heap_used_bytes = snapshot.heap_used_bytes,
                        rss_bytes = snapshot.rss_bytes,
                        "🚨 MEMORY MONITOR: Critical memory pressure"
                    );
                    listener.on_memory_pressure();
                    self.publish(SubstrateEvent::MemoryPressure);
                }
            }
            MemorySignal::Warning => {
                let snapshot = self.telemetry.snapshot();
                warn!(
                    heap_usage = snapshot.heap_usage_ratio(),
                    "⚠️ MEMORY MONITOR: Memory usage warning"
                );
            }
            MemorySignal::Normal => {
                if self.under_pressure.swap(false, Ordering::AcqRel) {
                    info!("✅ MEMORY MONITOR: Memory pressure cleared");
                    listener.on_memory_pressure_cleared();
                    self.publish(SubstrateEvent::MemoryPressureCleared);
                }
            }
        }
    }

    pub fn stop(&self) {
        self.shutdown_token.cancel();
    }

    fn publish(&self, event: SubstrateEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}
