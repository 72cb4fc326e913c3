//! Error types for the ingestion crate.

use storage::StoreError;
use thiserror::Error;

/// A snapshot that cannot be turned into a [`SnapshotRecord`](crate::SnapshotRecord).
///
/// Such records are dropped: without their identity fields they cannot be
/// merged or de-duplicated.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid timestamp in {field}: {value}")]
    InvalidTimestamp { field: String, value: String },
}

/// Records claiming the same station disagree on structure.
///
/// The whole station group is dropped for the batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("Station {station} reported as both '{first}' and '{other}'")]
    ConflictingStation {
        station: String,
        first: String,
        other: String,
    },

    #[error("Parameter {parameter} on station {station} reported in both '{first}' and '{other}'")]
    ConflictingParameter {
        station: String,
        parameter: String,
        first: String,
        other: String,
    },
}

/// Errors that abort an ingestion run.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Store unavailable after {processed} station(s), run aborted: {source}")]
    Aborted {
        processed: usize,
        #[source]
        source: StoreError,
    },
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
