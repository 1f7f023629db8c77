use std::time::Duration;

/// Errors surfaced by guarded datastore access
#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    #[error("Datastore has not been initialized")]
    NotInitialized,

    #[error("Datastore has been shut down")]
    ShutDown,

    /// The circuit breaker is open; the datastore was not contacted
    #[error("{resource} is unavailable (circuit open)")]
    Unavailable { resource: String },

    #[error("Timed out acquiring a pooled connection after {0:?}")]
    AcquireTimeout(Duration),

    #[error("Query timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Invalid connection settings: {0}")]
    Configuration(String),

    #[error("Datastore initialization failed after {attempts} attempts: {last_error}")]
    InitializationFailed { attempts: u32, last_error: String },
}

impl DatastoreError {
    /// True when the resource is known to be down rather than the query failing
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DatastoreError::Unavailable { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            DatastoreError::AcquireTimeout(_) | DatastoreError::QueryTimeout(_)
        )
    }
}

impl From<sqlx::Error> for DatastoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::PoolTimedOut => {
                DatastoreError::Connection("timed out waiting for a pooled connection".to_string())
            }
            sqlx::Error::PoolClosed => DatastoreError::Connection("pool is closed".to_string()),
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Configuration(_) => {
                DatastoreError::Connection(error.to_string())
            }
            _ => DatastoreError::Query(error.to_string()),
        }
    }
}
