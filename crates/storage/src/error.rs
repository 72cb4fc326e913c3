//! Error types for station stores.

use thiserror::Error;

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a [`StationStore`](crate::StationStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer inserted the same station key first
    #[error("Station already exists: {0}")]
    DuplicateKey(String),

    /// The station targeted by an update does not exist
    #[error("Station not found: {0}")]
    NotFound(String),

    #[error("Parameter {parameter} not found on station {station}")]
    ParameterNotFound { station: String, parameter: String },

    /// The store cannot be reached; fatal for a run
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether this error should abort a whole batch rather than one station.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_fatal() {
        assert!(StoreError::Unavailable("refused".into()).is_fatal());
        assert!(!StoreError::DuplicateKey("1".into()).is_fatal());
        assert!(!StoreError::NotFound("1".into()).is_fatal());
        assert!(!StoreError::Database("syntax".into()).is_fatal());
    }

    #[test]
    fn test_sqlx_pool_errors_map_to_unavailable() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Unavailable(_)));

        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
