//! # Fault Boundary
//!
//! Last-resort capture for faults that escape component error handling.
//!
//! Background units of work are spawned through [`FaultBoundary::spawn_guarded`]
//! and the process entry point runs inside [`FaultBoundary::run_top_level`], so
//! every error or panic is routed here explicitly instead of through a runtime
//! hook. The boundary never propagates a failure of its own: recovery handler
//! errors and panics are recorded as further warnings.

use super::classification::{ErrorRecord, Fault, FaultCategory, FaultOrigin, FaultSeverity};
use crate::config::FaultBoundaryConfig;
use crate::constants::system;
use crate::error::SubstrateError;
use crate::events::{EventPublisher, SubstrateEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Recovery routine registered for a fault category
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    async fn recover(&self, fault: &Fault) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`RecoveryHandler`]
pub struct FnRecoveryHandler<F>(F);

impl<F> FnRecoveryHandler<F>
where
    F: Fn(Fault) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self(handler)
    }
}

#[async_trait]
impl<F> RecoveryHandler for FnRecoveryHandler<F>
where
    F: Fn(Fault) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
{
    async fn recover(&self, fault: &Fault) -> anyhow::Result<()> {
        (self.0)(fault.clone()).await
    }
}

/// Ends the process after a fatal fault
pub trait ProcessTerminator: Send + Sync + std::fmt::Debug {
    fn terminate(&self, exit_code: i32);
}

/// Terminator that exits the current process
#[derive(Debug, Default)]
pub struct ExitProcessTerminator;

impl ProcessTerminator for ExitProcessTerminator {
    fn terminate(&self, exit_code: i32) {
        std::process::exit(exit_code);
    }
}

/// Aggregated fault statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorStats {
    pub total: u64,
    pub warning: u64,
    pub critical: u64,
    pub fatal: u64,
    /// Most recent records, newest last
    pub recent: Vec<ErrorRecord>,
}

impl ErrorStats {
    pub fn count(&self, severity: FaultSeverity) -> u64 {
        match severity {
            FaultSeverity::Warning => self.warning,
            FaultSeverity::Critical => self.critical,
            FaultSeverity::Fatal => self.fatal,
        }
    }
}

#[derive(Debug, Default)]
struct FaultHistory {
    records: VecDeque<ErrorRecord>,
    total: u64,
    warning: u64,
    critical: u64,
    fatal: u64,
}

/// Process-wide fault capture and recovery dispatch
pub struct FaultBoundary {
    config: FaultBoundaryConfig,
    active: AtomicBool,
    terminating: AtomicBool,
    history: Mutex<FaultHistory>,
    handlers: DashMap<FaultCategory, Arc<dyn RecoveryHandler>>,
    terminator: Arc<dyn ProcessTerminator>,
    events: Option<EventPublisher>,
}

impl std::fmt::Debug for FaultBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultBoundary")
            .field("active", &self.is_active())
            .field("handlers", &self.handlers.len())
            .field("history_capacity", &self.config.history_capacity)
            .finish()
    }
}

impl FaultBoundary {
    pub fn new(config: FaultBoundaryConfig) -> Self {
        Self {
            config,
            active: AtomicBool::new(false),
            terminating: AtomicBool::new(false),
            history: Mutex::new(FaultHistory::default()),
            handlers: DashMap::new(),
            terminator: Arc::new(ExitProcessTerminator),
            events: None,
        }
    }

    /// Replace the process terminator used for fatal faults
    pub fn with_terminator(mut self, terminator: Arc<dyn ProcessTerminator>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    /// Start dispatching recovery and honouring fatal faults
    pub fn activate(&self) {
        if !self.active.swap(true, Ordering::AcqRel) {
            info!(
                known_safe = ?self.config.known_safe,
                history_capacity = self.config.history_capacity,
                "🛡️ FAULT BOUNDARY: Activated"
            );
        }
    }

    /// Stop dispatching; faults are still recorded and logged
    pub fn deactivate(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            info!("🛡️ FAULT BOUNDARY: Deactivated");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Associate a recovery routine with a category; the last registration wins
    pub fn register_recovery_handler(&self, category: FaultCategory, handler: Arc<dyn RecoveryHandler>) {
        if self.handlers.insert(category, handler).is_some() {
            debug!(category = %category, "Replaced existing recovery handler");
        } else {
            debug!(category = %category, "Registered recovery handler");
        }
    }

    /// Severity a fault would receive, without recording it
    pub fn classify(&self, fault: &Fault, origin: FaultOrigin) -> FaultSeverity {
        if self.config.known_safe.contains(&fault.kind) {
            return FaultSeverity::Warning;
        }
        match origin {
            FaultOrigin::Background => FaultSeverity::Critical,
            FaultOrigin::TopLevel => FaultSeverity::Fatal,
        }
    }

    /// Classify, record and act on a fault.
    ///
    /// Critical faults are dispatched to the category's recovery handler.
    /// Fatal faults wait out the grace period and then terminate the process;
    /// with a non-exiting terminator this returns afterwards.
    pub async fn capture(&self, fault: Fault, origin: FaultOrigin) -> FaultSeverity {
        let severity = self.classify(&fault, origin);
        self.record(&fault, severity, origin);

        if !self.is_active() {
            return severity;
        }

        match severity {
            FaultSeverity::Warning => {}
            FaultSeverity::Critical => self.dispatch_recovery(&fault).await,
            FaultSeverity::Fatal => self.terminate_after_grace(&fault).await,
        }

        severity
    }

    /// Capture a typed substrate error
    pub async fn capture_error(&self, error: &SubstrateError, origin: FaultOrigin) -> FaultSeverity {
        self.capture(Fault::from_error(error), origin).await
    }

    /// Spawn a background unit of work whose error or panic is captured here
    pub fn spawn_guarded<F>(self: &Arc<Self>, name: &str, category: FaultCategory, future: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boundary = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => debug!(unit = %name, "Guarded unit of work finished"),
                Ok(Err(err)) => {
                    let fault = Fault::from_anyhow(category, &err.context(format!("background unit '{name}'")));
                    boundary.capture(fault, FaultOrigin::Background).await;
                }
                Err(payload) => {
                    boundary
                        .capture(Fault::from_panic(category, payload), FaultOrigin::Background)
                        .await;
                }
            }
        })
    }

    /// Run the process entry future; an error or panic is a fatal fault
    pub async fn run_top_level<F, T>(&self, future: F) -> Option<T>
    where
        F: Future<Output = Result<T, SubstrateError>>,
    {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                self.capture_error(&err, FaultOrigin::TopLevel).await;
                None
            }
            Err(payload) => {
                self.capture(
                    Fault::from_panic(FaultCategory::Internal, payload),
                    FaultOrigin::TopLevel,
                )
                .await;
                None
            }
        }
    }

    /// Totals, per-severity counts and the `recent` newest records
    pub fn error_stats(&self, recent: usize) -> ErrorStats {
        let history = self.history.lock();
        let skip = history.records.len().saturating_sub(recent);
        ErrorStats {
            total: history.total,
            warning: history.warning,
            critical: history.critical,
            fatal: history.fatal,
            recent: history.records.iter().skip(skip).cloned().collect(),
        }
    }

    fn record(&self, fault: &Fault, severity: FaultSeverity, origin: FaultOrigin) {
        match severity {
            FaultSeverity::Warning => warn!(
                category = %fault.category,
                kind = ?fault.kind,
                origin = ?origin,
                "⚠️ FAULT: {}", fault.message
            ),
            FaultSeverity::Critical => error!(
                category = %fault.category,
                kind = ?fault.kind,
                origin = ?origin,
                "🔴 FAULT: {}", fault.message
            ),
            FaultSeverity::Fatal => error!(
                category = %fault.category,
                kind = ?fault.kind,
                origin = ?origin,
                backtrace = %fault.backtrace,
                "💀 FATAL FAULT: {}", fault.message
            ),
        }

        {
            let mut history = self.history.lock();
            history.total += 1;
            match severity {
                FaultSeverity::Warning => history.warning += 1,
                FaultSeverity::Critical => history.critical += 1,
                FaultSeverity::Fatal => history.fatal += 1,
            }
            history.records.push_back(ErrorRecord::new(fault, severity, origin));
            while history.records.len() > self.config.history_capacity {
                history.records.pop_front();
            }
        }

        if let Some(events) = &self.events {
            events.publish(SubstrateEvent::FaultCaptured {
                severity,
                category: fault.category,
                message: fault.message.clone(),
            });
        }
    }

    async fn dispatch_recovery(&self, fault: &Fault) {
        let handler = match self.handlers.get(&fault.category) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                debug!(category = %fault.category, "No recovery handler registered");
                return;
            }
        };

        info!(category = %fault.category, fault_id = %fault.id, "🔧 FAULT: Dispatching recovery");
        let outcome = AssertUnwindSafe(handler.recover(fault)).catch_unwind().await;

        let failure = match outcome {
            Ok(Ok(())) => {
                info!(category = %fault.category, "✅ FAULT: Recovery handler completed");
                return;
            }
            Ok(Err(err)) => Fault::new(
                fault.category,
                super::FaultKind::Internal,
                format!("recovery handler for {} failed: {err:#}", fault.category),
            ),
            Err(payload) => {
                let mut panic_fault = Fault::from_panic(fault.category, payload);
                panic_fault.message = format!("recovery handler for {} {}", fault.category, panic_fault.message);
                panic_fault
            }
        };
        self.record(&failure, FaultSeverity::Warning, FaultOrigin::Background);
    }

    async fn terminate_after_grace(&self, fault: &Fault) {
        if self.terminating.swap(true, Ordering::AcqRel) {
            debug!(fault_id = %fault.id, "Termination already scheduled");
            return;
        }
        let grace = self.config.fatal_grace_period();
        error!(
            grace_ms = grace.as_millis() as u64,
            "💀 FAULT BOUNDARY: Terminating process after grace period"
        );
        tokio::time::sleep(grace).await;
        self.terminator.terminate(system::FATAL_EXIT_CODE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultKind;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingTerminator {
        calls: Mutex<Vec<i32>>,
    }

    impl ProcessTerminator for RecordingTerminator {
        fn terminate(&self, exit_code: i32) {
            self.calls.lock().push(exit_code);
        }
    }

    fn boundary_with(terminator: Arc<RecordingTerminator>) -> FaultBoundary {
        let config = FaultBoundaryConfig {
            history_capacity: 3,
            fatal_grace_period_ms: 1_000,
            ..Default::default()
        };
        let boundary = FaultBoundary::new(config).with_terminator(terminator);
        boundary.activate();
        boundary
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> Arc<dyn RecoveryHandler> {
        Arc::new(FnRecoveryHandler::new(move |_fault| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }))
    }

    #[tokio::test]
    async fn test_known_safe_fault_is_warning() {
        let boundary = boundary_with(Arc::default());
        let counter = Arc::new(AtomicUsize::new(0));
        boundary.register_recovery_handler(FaultCategory::Internal, counting_handler(counter.clone()));

        let fault = Fault::new(FaultCategory::Internal, FaultKind::TransientAuth, "token expired");
        let severity = boundary.capture(fault, FaultOrigin::Background).await;

        assert_eq!(severity, FaultSeverity::Warning);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(boundary.error_stats(10).warning, 1);
    }

    #[tokio::test]
    async fn test_background_fault_dispatches_recovery() {
        let boundary = boundary_with(Arc::default());
        let counter = Arc::new(AtomicUsize::new(0));
        boundary.register_recovery_handler(FaultCategory::Database, counting_handler(counter.clone()));

        let fault = Fault::new(FaultCategory::Database, FaultKind::Unclassified, "connection reset");
        let severity = boundary.capture(fault, FaultOrigin::Background).await;

        assert_eq!(severity, FaultSeverity::Critical);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_registered_handler_wins() {
        let boundary = boundary_with(Arc::default());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        boundary.register_recovery_handler(FaultCategory::Memory, counting_handler(first.clone()));
        boundary.register_recovery_handler(FaultCategory::Memory, counting_handler(second.clone()));

        let fault = Fault::new(FaultCategory::Memory, FaultKind::ResourceExhausted, "heap");
        boundary.capture(fault, FaultOrigin::Background).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_and_panicking_handlers_become_warnings() {
        let boundary = boundary_with(Arc::default());
        boundary.register_recovery_handler(
            FaultCategory::Database,
            Arc::new(FnRecoveryHandler::new(|_fault| {
                async { Err(anyhow::anyhow!("pool still down")) }.boxed()
            })),
        );
        boundary.register_recovery_handler(
            FaultCategory::Memory,
            Arc::new(FnRecoveryHandler::new(|_fault| {
                async { panic!("handler bug") }.boxed()
            })),
        );

        boundary
            .capture(
                Fault::new(FaultCategory::Database, FaultKind::Unclassified, "db"),
                FaultOrigin::Background,
            )
            .await;
        boundary
            .capture(
                Fault::new(FaultCategory::Memory, FaultKind::Unclassified, "mem"),
                FaultOrigin::Background,
            )
            .await;

        let stats = boundary.error_stats(10);
        assert_eq!(stats.critical, 2);
        assert_eq!(stats.warning, 2);
        assert_eq!(stats.total, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_top_level_fault_terminates_after_grace() {
        let terminator = Arc::new(RecordingTerminator::default());
        let boundary = boundary_with(terminator.clone());

        let start = tokio::time::Instant::now();
        let result: Option<()> = boundary
            .run_top_level(async { Err(SubstrateError::Internal("entry failed".into())) })
            .await;

        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(1_000));
        assert_eq!(*terminator.calls.lock(), vec![system::FATAL_EXIT_CODE]);
        assert_eq!(boundary.error_stats(1).fatal, 1);
    }

    #[tokio::test]
    async fn test_inactive_boundary_records_without_terminating() {
        let terminator = Arc::new(RecordingTerminator::default());
        let boundary = boundary_with(terminator.clone());
        boundary.deactivate();

        let severity = boundary
            .capture(
                Fault::new(FaultCategory::Internal, FaultKind::Internal, "late"),
                FaultOrigin::TopLevel,
            )
            .await;

        assert_eq!(severity, FaultSeverity::Fatal);
        assert!(terminator.calls.lock().is_empty());
        assert_eq!(boundary.error_stats(5).recent.len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_bounded_ring_buffer() {
        let boundary = boundary_with(Arc::default());
        for index in 0..5 {
            boundary
                .capture(
                    Fault::new(FaultCategory::Internal, FaultKind::TransientAuth, format!("fault {index}")),
                    FaultOrigin::Background,
                )
                .await;
        }

        let stats = boundary.error_stats(10);
        assert_eq!(stats.total, 5);
        let messages: Vec<_> = stats.recent.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["fault 2", "fault 3", "fault 4"]);
        assert_eq!(boundary.error_stats(1).recent[0].message, "fault 4");
    }

    #[tokio::test]
    async fn test_spawn_guarded_captures_errors_and_panics() {
        let boundary = Arc::new(boundary_with(Arc::default()));

        boundary
            .spawn_guarded("failing", FaultCategory::Task, async { Err(anyhow::anyhow!("nope")) })
            .await
            .unwrap();
        boundary
            .spawn_guarded("panicking", FaultCategory::Task, async { panic!("kaboom") })
            .await
            .unwrap();
        boundary
            .spawn_guarded("fine", FaultCategory::Task, async { Ok(()) })
            .await
            .unwrap();

        let stats = boundary.error_stats(10);
        assert_eq!(stats.critical, 2);
        assert!(stats.recent.iter().all(|r| r.origin == FaultOrigin::Background));
        assert!(stats.recent[1].message.contains("kaboom"));
    }
}
