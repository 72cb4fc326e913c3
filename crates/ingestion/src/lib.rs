//! Station observation ingestion library.
//!
//! Merges observation snapshots into per-station documents without
//! duplicating windows or losing stored parameters.
//!
//! # Architecture
//!
//! - [`snapshot`]: validates provider snapshots into [`SnapshotRecord`]s
//! - [`aggregate`](mod@aggregate): folds records into one document per station
//! - [`reconcile`](mod@reconcile): computes the additive [`ChangeSet`] against the store
//! - [`writer`]: applies a change set as targeted store operations
//! - [`Ingester`]: runs the above over a batch and reports a [`RunSummary`]

pub mod aggregate;
pub mod error;
mod ingester;
pub mod reconcile;
pub mod snapshot;
pub mod writer;

// Re-exports
pub use aggregate::{aggregate, aggregate_at, Aggregated};
pub use error::{AggregationError, IngestionError, ParseError, Result};
pub use ingester::{Failure, FailureStage, Ingester, RunSummary};
pub use reconcile::{reconcile, reconcile_at, ChangeSet};
pub use snapshot::{
    parse_snapshot, parse_snapshot_value, ParameterInfo, PeriodInfo, SnapshotInput,
    SnapshotRecord,
};
pub use writer::{apply, ApplyOutcome, ApplyReport, OpFailure};
