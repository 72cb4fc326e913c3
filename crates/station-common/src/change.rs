//! Store-facing change primitives.
//!
//! An update against a persisted document is a metadata "set" plus zero or
//! more additive appends. Appends are idempotent: re-applying one that is
//! already present changes nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{ParameterBlock, PeriodBlock, StationDocument, StationMetadata};

/// Metadata overwrite applied on every update (last write wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub metadata: StationMetadata,
    pub last_updated: DateTime<Utc>,
}

/// An additive change to one station document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AppendOp {
    /// Add a parameter the station does not have yet
    AppendParameter(ParameterBlock),
    /// Add a new window to an existing parameter
    AppendPeriod {
        parameter_key: String,
        period: PeriodBlock,
    },
}

impl AppendOp {
    /// Key of the parameter this operation targets.
    pub fn parameter_key(&self) -> &str {
        match self {
            AppendOp::AppendParameter(block) => &block.key,
            AppendOp::AppendPeriod { parameter_key, .. } => parameter_key,
        }
    }

    /// Short label for logs and failure reports.
    pub fn describe(&self) -> String {
        match self {
            AppendOp::AppendParameter(block) => format!(
                "append parameter {} ({} period(s))",
                block.key,
                block.periods.len()
            ),
            AppendOp::AppendPeriod {
                parameter_key,
                period,
            } => format!(
                "append period {}@{} to parameter {}",
                period.key,
                period.from.to_rfc3339(),
                parameter_key
            ),
        }
    }
}

/// Reason an in-memory append could not be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// The targeted parameter does not exist on the document
    #[error("Parameter not found: {0}")]
    MissingParameter(String),
}

impl StationDocument {
    /// Apply one append in place.
    ///
    /// Returns `Ok(true)` when the document changed, `Ok(false)` when the
    /// parameter or period was already present.
    pub fn apply_append(&mut self, op: &AppendOp) -> Result<bool, ApplyError> {
        match op {
            AppendOp::AppendParameter(block) => {
                if let Some(existing) = self.find_parameter_mut(&block.key) {
                    // Concurrent writer got there first; merge windows instead.
                    let mut changed = false;
                    for period in &block.periods {
                        if !existing.has_period(&period.key, period.from) {
                            existing.periods.push(period.clone());
                            changed = true;
                        }
                    }
                    return Ok(changed);
                }
                self.parameters.push(block.clone());
                Ok(true)
            }
            AppendOp::AppendPeriod {
                parameter_key,
                period,
            } => {
                let parameter = self
                    .find_parameter_mut(parameter_key)
                    .ok_or_else(|| ApplyError::MissingParameter(parameter_key.clone()))?;
                if parameter.has_period(&period.key, period.from) {
                    return Ok(false);
                }
                parameter.periods.push(period.clone());
                Ok(true)
            }
        }
    }

    /// Overwrite metadata and `last_updated`.
    pub fn apply_metadata(&mut self, update: &MetadataUpdate) {
        self.metadata = update.metadata.clone();
        self.last_updated = update.last_updated;
    }

    /// Apply appends first, then the metadata set.
    ///
    /// Stops at the first append that cannot be applied, leaving metadata
    /// untouched.
    pub fn apply(&mut self, update: &MetadataUpdate, appends: &[AppendOp]) -> Result<(), ApplyError> {
        for op in appends {
            self.apply_append(op)?;
        }
        self.apply_metadata(update);
        Ok(())
    }
}
