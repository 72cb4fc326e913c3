//! Station document model.
//!
//! Serialized field names follow the observation provider (`ownerCategory`,
//! `measuringStations`, epoch-millisecond timestamps) so a document reads the
//! same as the snapshots it was built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::epoch_millis;

/// A single raw observation inside a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "date", with = "epoch_millis")]
    pub timestamp: DateTime<Utc>,
    /// Measured value as reported upstream (not always numeric)
    #[serde(rename = "value")]
    pub measurement: String,
    /// Provider quality flag (e.g. "G", "Y")
    pub quality: String,
}

/// A named observation window with its samples.
///
/// Unique within a [`ParameterBlock`] by `(key, from)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBlock {
    pub key: String,
    #[serde(with = "epoch_millis")]
    pub from: DateTime<Utc>,
    #[serde(with = "epoch_millis")]
    pub to: DateTime<Utc>,
    pub summary: String,
    pub sampling: String,
    /// Samples in the order received. Not guaranteed chronological.
    pub values: Vec<Sample>,
}

impl PeriodBlock {
    /// De-duplication key of this window.
    pub fn dedup_key(&self) -> (&str, DateTime<Utc>) {
        (self.key.as_str(), self.from)
    }

    /// Whether this window has the given de-duplication key.
    pub fn matches(&self, key: &str, from: DateTime<Utc>) -> bool {
        self.key == key && self.from == from
    }
}

/// One measured quantity at a station and every window ingested for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBlock {
    pub key: String,
    pub name: String,
    pub summary: String,
    pub unit: String,
    pub periods: Vec<PeriodBlock>,
}

impl ParameterBlock {
    pub fn find_period(&self, key: &str, from: DateTime<Utc>) -> Option<&PeriodBlock> {
        self.periods.iter().find(|p| p.matches(key, from))
    }

    pub fn has_period(&self, key: &str, from: DateTime<Utc>) -> bool {
        self.find_period(key, from).is_some()
    }
}

/// Station metadata. Always overwritten with the latest fetched values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationMetadata {
    pub name: String,
    pub owner: String,
    pub owner_category: String,
    pub measuring_stations: String,
    pub height: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Canonical per-station aggregate.
///
/// At most one document exists per `key`; parameter keys are unique within
/// `parameters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationDocument {
    pub key: String,
    #[serde(flatten)]
    pub metadata: StationMetadata,
    #[serde(with = "epoch_millis")]
    pub last_updated: DateTime<Utc>,
    pub parameters: Vec<ParameterBlock>,
}

impl StationDocument {
    /// Create an empty document for a station.
    pub fn new(key: impl Into<String>, metadata: StationMetadata, last_updated: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            metadata,
            last_updated,
            parameters: Vec::new(),
        }
    }

    pub fn find_parameter(&self, key: &str) -> Option<&ParameterBlock> {
        self.parameters.iter().find(|p| p.key == key)
    }

    pub fn find_parameter_mut(&mut self, key: &str) -> Option<&mut ParameterBlock> {
        self.parameters.iter_mut().find(|p| p.key == key)
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Total number of periods across all parameters.
    pub fn period_count(&self) -> usize {
        self.parameters.iter().map(|p| p.periods.len()).sum()
    }
}
