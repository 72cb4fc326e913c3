//! Common types shared across the station ingestion workspace.
//!
//! A [`StationDocument`] is the unit of persistence: one per station key,
//! holding the station metadata and every parameter/period ever ingested
//! for it. [`AppendOp`] and [`MetadataUpdate`] are the store-facing halves
//! of an incremental update.

pub mod change;
pub mod document;
pub mod time;

pub use change::{AppendOp, ApplyError, MetadataUpdate};
pub use document::{ParameterBlock, PeriodBlock, Sample, StationDocument, StationMetadata};
pub use time::{epoch_millis, from_epoch_millis};
