//! Batch ingestion over a station store.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use station_common::StationDocument;
use storage::{StationStore, StoreError};

use crate::aggregate::aggregate;
use crate::error::{IngestionError, Result};
use crate::reconcile::reconcile;
use crate::snapshot::{parse_snapshot, SnapshotInput, SnapshotRecord};
use crate::writer::{apply, ApplyOutcome, ApplyReport};

/// Stage at which something was dropped or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Parse,
    Aggregate,
    Store,
}

/// One reported failure.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub stage: FailureStage,
    /// Snapshot origin for parse failures, station key otherwise
    pub subject: String,
    pub message: String,
}

/// Counts for one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub records_read: usize,
    pub records_rejected: usize,
    pub stations_inserted: usize,
    pub stations_updated: usize,
    pub stations_unchanged: usize,
    pub stations_failed: usize,
    pub failures: Vec<Failure>,
}

impl RunSummary {
    pub fn stations_processed(&self) -> usize {
        self.stations_inserted + self.stations_updated + self.stations_unchanged + self.stations_failed
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, stage: FailureStage, subject: impl Into<String>, message: impl ToString) {
        self.failures.push(Failure {
            stage,
            subject: subject.into(),
            message: message.to_string(),
        });
    }
}

/// Merge-and-upsert engine.
///
/// Reads snapshots, aggregates them per station, reconciles each station
/// against the store and applies the difference. Each station is one
/// serialized unit (read, reconcile, write); distinct stations may run
/// concurrently up to the configured limit.
pub struct Ingester<S: ?Sized> {
    store: Arc<S>,
    concurrency: usize,
}

impl<S> Ingester<S>
where
    S: StationStore + ?Sized,
{
    /// Create a sequential ingester.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            concurrency: 1,
        }
    }

    /// Process up to `limit` distinct stations at once.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Parse, aggregate and persist a batch of raw snapshots.
    pub async fn run(&self, inputs: impl IntoIterator<Item = SnapshotInput>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut records = Vec::new();

        for input in inputs {
            summary.records_read += 1;
            match parse_snapshot(&input.body) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(origin = %input.origin, error = %e, "Dropping snapshot");
                    summary.records_rejected += 1;
                    summary.fail(FailureStage::Parse, input.origin, e);
                }
            }
        }

        self.persist(records, summary).await
    }

    /// Aggregate and persist already validated records.
    pub async fn run_records(&self, records: Vec<SnapshotRecord>) -> Result<RunSummary> {
        let summary = RunSummary {
            records_read: records.len(),
            ..Default::default()
        };
        self.persist(records, summary).await
    }

    async fn persist(
        &self,
        records: Vec<SnapshotRecord>,
        mut summary: RunSummary,
    ) -> Result<RunSummary> {
        let mut documents = Vec::new();
        for (station_key, result) in aggregate(records) {
            match result {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    error!(station = %station_key, error = %e, "Dropping station group");
                    summary.stations_failed += 1;
                    summary.fail(FailureStage::Aggregate, station_key, e);
                }
            }
        }
        documents.sort_by(|a, b| a.key.cmp(&b.key));

        info!(
            stations = documents.len(),
            concurrency = self.concurrency,
            "Reconciling stations"
        );

        let mut results = stream::iter(documents.iter())
            .map(|doc| async move { (doc.key.as_str(), self.sync_station(doc).await) })
            .buffer_unordered(self.concurrency);

        while let Some((station_key, result)) = results.next().await {
            match result {
                Ok(report) => {
                    match report.outcome {
                        ApplyOutcome::Inserted => summary.stations_inserted += 1,
                        ApplyOutcome::Updated if report.is_complete() => {
                            summary.stations_updated += 1
                        }
                        ApplyOutcome::Unchanged if report.is_complete() => {
                            summary.stations_unchanged += 1
                        }
                        _ => summary.stations_failed += 1,
                    }
                    for failure in report.failures {
                        summary.fail(
                            FailureStage::Store,
                            station_key,
                            format!("{}: {}", failure.operation, failure.error),
                        );
                    }
                }
                Err(e) if e.is_fatal() => {
                    let processed = summary.stations_processed();
                    error!(station = %station_key, error = %e, processed, "Store unavailable, aborting run");
                    return Err(IngestionError::Aborted {
                        processed,
                        source: e,
                    });
                }
                Err(e) => {
                    error!(station = %station_key, error = %e, "Station failed");
                    summary.stations_failed += 1;
                    summary.fail(FailureStage::Store, station_key, e);
                }
            }
        }

        info!(
            inserted = summary.stations_inserted,
            updated = summary.stations_updated,
            unchanged = summary.stations_unchanged,
            failed = summary.stations_failed,
            rejected = summary.records_rejected,
            "Ingestion run complete"
        );

        Ok(summary)
    }

    /// Read, reconcile and write one station.
    ///
    /// An insert that loses a race is retried once as an update against the
    /// now-existing document; an update whose station vanished is retried
    /// once as an insert.
    #[instrument(skip(self, fresh), fields(station = %fresh.key))]
    pub async fn sync_station(
        &self,
        fresh: &StationDocument,
    ) -> std::result::Result<ApplyReport, StoreError> {
        let existing = self.store.find_by_key(&fresh.key).await?;
        let changes = reconcile(fresh, existing.as_ref());

        match apply(&*self.store, &fresh.key, &changes).await {
            Err(StoreError::DuplicateKey(_)) => {
                info!("Station inserted concurrently, reconciling against it");
                let existing = self.store.find_by_key(&fresh.key).await?;
                let changes = reconcile(fresh, existing.as_ref());
                apply(&*self.store, &fresh.key, &changes).await
            }
            Err(StoreError::NotFound(_)) => {
                info!("Station removed concurrently, inserting it again");
                let changes = reconcile(fresh, None);
                apply(&*self.store, &fresh.key, &changes).await
            }
            other => other,
        }
    }
}
