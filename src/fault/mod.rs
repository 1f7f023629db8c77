//! # Fault Boundary
//!
//! Process-wide capture of faults that escape all other error handling, with
//! severity classification, a bounded history and per-category recovery.

pub mod boundary;
pub mod classification;

pub use boundary::{
    ErrorStats, ExitProcessTerminator, FaultBoundary, FnRecoveryHandler, ProcessTerminator,
    RecoveryHandler,
};
pub use classification::{ErrorRecord, Fault, FaultCategory, FaultKind, FaultOrigin, FaultSeverity};
