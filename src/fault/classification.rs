//! # Fault Classification
//!
//! Faults carry a structural [`FaultKind`] tag instead of relying on message
//! text, so deciding whether a fault is known-safe is a plain enum comparison.

use crate::database::DatastoreError;
use crate::error::SubstrateError;
use crate::scheduler::SchedulerError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::backtrace::Backtrace;
use uuid::Uuid;

/// How far a fault propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultSeverity {
    /// Known and recoverable, recorded and counted only
    Warning,
    /// Triggers the recovery handler registered for the fault category
    Critical,
    /// Unrecoverable, the process terminates after the grace period
    Fatal,
}

/// Recovery routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCategory {
    Database,
    Memory,
    Task,
    Bootstrap,
    Configuration,
    Internal,
}

impl std::fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultCategory::Database => write!(f, "database"),
            FaultCategory::Memory => write!(f, "memory"),
            FaultCategory::Task => write!(f, "task"),
            FaultCategory::Bootstrap => write!(f, "bootstrap"),
            FaultCategory::Configuration => write!(f, "configuration"),
            FaultCategory::Internal => write!(f, "internal"),
        }
    }
}

/// Structural tag used for known-safe matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Authentication backend briefly unavailable
    TransientAuth,
    /// Optional input field absent where a value was dereferenced
    MissingOptionalField,
    Timeout,
    /// Protected resource is known to be down (open circuit)
    ResourceUnavailable,
    /// Capacity limit reached (queue full, memory pressure)
    ResourceExhausted,
    Internal,
    Unclassified,
}

/// Where the fault escaped from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultOrigin {
    /// A background unit of work returned an error or panicked
    Background,
    /// The process entry point returned an error or panicked
    TopLevel,
}

/// A fault that escaped component-level error handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    pub id: Uuid,
    pub message: String,
    pub category: FaultCategory,
    pub kind: FaultKind,
    pub backtrace: String,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

impl Fault {
    pub fn new(category: FaultCategory, kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: message.into(),
            category,
            kind,
            backtrace: Backtrace::capture().to_string(),
            occurred_at: chrono::Utc::now(),
        }
    }

    /// Derive category and kind from a typed substrate error
    pub fn from_error(error: &SubstrateError) -> Self {
        let (category, kind) = match error {
            SubstrateError::Configuration(_) => (FaultCategory::Configuration, FaultKind::Internal),
            SubstrateError::Datastore(inner) => (FaultCategory::Database, Self::datastore_kind(inner)),
            SubstrateError::Scheduler(SchedulerError::QueueFull { .. }) => {
                (FaultCategory::Task, FaultKind::ResourceExhausted)
            }
            SubstrateError::Scheduler(_) => (FaultCategory::Task, FaultKind::Unclassified),
            SubstrateError::Bootstrap(_) => (FaultCategory::Bootstrap, FaultKind::Unclassified),
            SubstrateError::Event(_) => (FaultCategory::Internal, FaultKind::Internal),
            SubstrateError::MemoryPressure(_) => (FaultCategory::Memory, FaultKind::ResourceExhausted),
            SubstrateError::TransientAuth(_) => (FaultCategory::Internal, FaultKind::TransientAuth),
            SubstrateError::MissingOptionalField(_) => {
                (FaultCategory::Internal, FaultKind::MissingOptionalField)
            }
            SubstrateError::InvalidState(_) | SubstrateError::Internal(_) => {
                (FaultCategory::Internal, FaultKind::Internal)
            }
        };
        Self::new(category, kind, error.to_string())
    }

    /// Classify an opaque error, preferring the typed mapping when the error
    /// is (or wraps) a [`SubstrateError`]
    pub fn from_anyhow(default_category: FaultCategory, error: &anyhow::Error) -> Self {
        if let Some(substrate) = error.downcast_ref::<SubstrateError>() {
            return Self::from_error(substrate);
        }
        if let Some(datastore) = error.downcast_ref::<DatastoreError>() {
            return Self::new(
                FaultCategory::Database,
                Self::datastore_kind(datastore),
                format!("{error:#}"),
            );
        }
        Self::new(default_category, FaultKind::Unclassified, format!("{error:#}"))
    }

    /// Build a fault from a caught panic payload
    pub fn from_panic(category: FaultCategory, payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(payload.as_ref());
        Self::new(category, FaultKind::Internal, format!("panic: {message}"))
    }

    fn datastore_kind(error: &DatastoreError) -> FaultKind {
        match error {
            DatastoreError::Unavailable { .. } => FaultKind::ResourceUnavailable,
            DatastoreError::AcquireTimeout(_) | DatastoreError::QueryTimeout(_) => FaultKind::Timeout,
            _ => FaultKind::Unclassified,
        }
    }
}

/// Text carried by a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Immutable entry in the fault history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub fault_id: Uuid,
    pub message: String,
    pub backtrace: String,
    pub severity: FaultSeverity,
    pub category: FaultCategory,
    pub kind: FaultKind,
    pub origin: FaultOrigin,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorRecord {
    pub(crate) fn new(fault: &Fault, severity: FaultSeverity, origin: FaultOrigin) -> Self {
        Self {
            fault_id: fault.id,
            message: fault.message.clone(),
            backtrace: fault.backtrace.clone(),
            severity,
            category: fault.category,
            kind: fault.kind,
            origin,
            timestamp: chrono::Utc::now(),
        }
    }
}
