//! Error types for the substrate.
//!
//! Every component owns a focused `thiserror` enum; they all fold into
//! [`SubstrateError`] so callers that do not care about the origin can use `?`
//! across component boundaries.

use crate::config::ConfigurationError;
use crate::database::DatastoreError;
use crate::events::PublishError;
use crate::orchestration::BootstrapError;
use crate::scheduler::SchedulerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Datastore error: {0}")]
    Datastore(#[from] DatastoreError),
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),
    #[error("Event error: {0}")]
    Event(#[from] PublishError),
    #[error("Memory pressure: {0}")]
    MemoryPressure(String),
    #[error("Authentication temporarily unavailable: {0}")]
    TransientAuth(String),
    #[error("Missing optional field: {0}")]
    MissingOptionalField(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SubstrateError {
    fn from(error: serde_json::Error) -> Self {
        SubstrateError::Internal(format!("JSON serialization error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, SubstrateError>;
