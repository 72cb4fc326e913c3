//! Store Writer.
//!
//! Applies a [`ChangeSet`] as targeted store operations. An update never
//! rewrites the whole document: each append is its own atomic call that
//! also carries the metadata set, so metadata only advances together with
//! data it describes and re-applying after a crash is harmless.

use std::slice;
use tracing::{debug, warn};

use storage::{StationStore, StoreError};

use crate::reconcile::ChangeSet;

/// What happened to a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    /// At least one append was applied
    Updated,
    /// Only metadata was refreshed
    Unchanged,
}

/// A single append the store rejected.
#[derive(Debug)]
pub struct OpFailure {
    pub operation: String,
    pub error: StoreError,
}

/// Result of applying one station's change set.
#[derive(Debug)]
pub struct ApplyReport {
    pub outcome: ApplyOutcome,
    /// Store calls that succeeded
    pub applied: usize,
    /// Appends that failed; the others were still applied
    pub failures: Vec<OpFailure>,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Apply `changes` for `station_key`.
///
/// Returns `Err` for store errors that need the caller's policy:
/// `DuplicateKey` (insert lost a race), `NotFound` (station vanished) and
/// `Unavailable`. Any other failure of an individual append is recorded in
/// the report while the remaining appends proceed.
pub async fn apply<S>(
    store: &S,
    station_key: &str,
    changes: &ChangeSet,
) -> Result<ApplyReport, StoreError>
where
    S: StationStore + ?Sized,
{
    match changes {
        ChangeSet::Insert(document) => {
            store.insert(document).await?;
            Ok(ApplyReport {
                outcome: ApplyOutcome::Inserted,
                applied: 1,
                failures: Vec::new(),
            })
        }
        ChangeSet::Update { metadata, appends } if appends.is_empty() => {
            store
                .update_metadata_and_append(station_key, metadata, &[])
                .await?;
            Ok(ApplyReport {
                outcome: ApplyOutcome::Unchanged,
                applied: 1,
                failures: Vec::new(),
            })
        }
        ChangeSet::Update { metadata, appends } => {
            let mut applied = 0;
            let mut failures = Vec::new();

            for op in appends {
                match store
                    .update_metadata_and_append(station_key, metadata, slice::from_ref(op))
                    .await
                {
                    Ok(()) => {
                        debug!(station = %station_key, op = %op.describe(), "Applied");
                        applied += 1;
                    }
                    Err(e) if e.is_fatal() || matches!(e, StoreError::NotFound(_)) => {
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(
                            station = %station_key,
                            op = %op.describe(),
                            error = %e,
                            "Append failed"
                        );
                        failures.push(OpFailure {
                            operation: op.describe(),
                            error: e,
                        });
                    }
                }
            }

            let outcome = if applied > 0 {
                ApplyOutcome::Updated
            } else {
                ApplyOutcome::Unchanged
            };
            Ok(ApplyReport {
                outcome,
                applied,
                failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile_at;
    use chrono::{DateTime, TimeZone, Utc};
    use station_common::{ParameterBlock, PeriodBlock, StationDocument, StationMetadata};
    use storage::MemoryStationStore;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    /// Build a document from `(parameter, day)` windows.
    fn document(windows: &[(&str, u32)]) -> StationDocument {
        let mut doc = StationDocument::new(
            "188790",
            StationMetadata {
                name: "Abisko Aut".to_string(),
                ..Default::default()
            },
            at(1),
        );
        for (key, day) in windows {
            let period = PeriodBlock {
                key: "latest-hour".to_string(),
                from: at(*day),
                to: at(*day),
                summary: String::new(),
                sampling: String::new(),
                values: vec![],
            };
            match doc.find_parameter_mut(key) {
                Some(parameter) => parameter.periods.push(period),
                None => doc.parameters.push(ParameterBlock {
                    key: key.to_string(),
                    name: String::new(),
                    summary: String::new(),
                    unit: String::new(),
                    periods: vec![period],
                }),
            }
        }
        doc
    }

    #[tokio::test]
    async fn test_insert_then_duplicate() {
        let store = MemoryStationStore::new();
        let changes = reconcile_at(&document(&[("1", 1)]), None, at(2));

        let report = apply(&store, "188790", &changes).await.unwrap();
        assert_eq!(report.outcome, ApplyOutcome::Inserted);

        let err = apply(&store, "188790", &changes).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn test_metadata_only_update() {
        let existing = document(&[("1", 1)]);
        let store = MemoryStationStore::with_documents([existing.clone()]);
        let changes = reconcile_at(&existing, Some(&existing), at(5));

        let report = apply(&store, "188790", &changes).await.unwrap();
        assert_eq!(report.outcome, ApplyOutcome::Unchanged);

        let stored = store.find_by_key("188790").await.unwrap().unwrap();
        assert_eq!(stored.last_updated, at(5));
    }

    #[tokio::test]
    async fn test_failed_append_does_not_block_others() {
        let existing = document(&[("1", 1), ("2", 1)]);
        let store = MemoryStationStore::with_documents([existing.clone()]);
        let changes = reconcile_at(&document(&[("1", 2), ("2", 2)]), Some(&existing), at(5));
        assert_eq!(changes.append_count(), 2);

        // Parameter 1 disappears between read and write.
        store.remove("188790").await;
        store.insert(&document(&[("2", 1)])).await.unwrap();

        let report = apply(&store, "188790", &changes).await.unwrap();
        assert_eq!(report.outcome, ApplyOutcome::Updated);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            StoreError::ParameterNotFound { .. }
        ));

        let stored = store.find_by_key("188790").await.unwrap().unwrap();
        assert_eq!(stored.find_parameter("2").unwrap().periods.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_station_is_returned() {
        let existing = document(&[("1", 1)]);
        let store = MemoryStationStore::new();
        let changes = reconcile_at(&document(&[("1", 2)]), Some(&existing), at(5));

        let err = apply(&store, "188790", &changes).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
