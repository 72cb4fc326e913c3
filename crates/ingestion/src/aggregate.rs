//! Station Aggregator.
//!
//! Folds snapshot records into one [`StationDocument`] per station key.
//! Within a batch the first record's station metadata is the baseline
//! (first seen wins), while a repeated `(parameter, period key, period from)`
//! window takes the later record's block (last seen wins).

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use station_common::StationDocument;

use crate::error::AggregationError;
use crate::snapshot::SnapshotRecord;

/// Aggregation result per station key. Iteration order is not significant.
pub type Aggregated = HashMap<String, Result<StationDocument, AggregationError>>;

/// Group records by station, stamping documents with the current time.
pub fn aggregate(records: impl IntoIterator<Item = SnapshotRecord>) -> Aggregated {
    aggregate_at(records, Utc::now())
}

/// Group records by station, stamping documents with `now`.
pub fn aggregate_at(
    records: impl IntoIterator<Item = SnapshotRecord>,
    now: DateTime<Utc>,
) -> Aggregated {
    let mut stations: Aggregated = HashMap::new();

    for record in records {
        match stations.get_mut(&record.station_key) {
            None => {
                let mut doc =
                    StationDocument::new(record.station_key.clone(), record.station.clone(), now);
                doc.parameters.push(record.parameter_block());
                stations.insert(record.station_key, Ok(doc));
            }
            // Group already rejected; the rest of its records go with it.
            Some(Err(_)) => {}
            Some(Ok(doc)) => {
                if let Err(e) = fold(doc, &record) {
                    stations.insert(record.station_key, Err(e));
                }
            }
        }
    }

    stations
}

/// Fold one more record into an existing in-batch document.
fn fold(doc: &mut StationDocument, record: &SnapshotRecord) -> Result<(), AggregationError> {
    let station_key = doc.key.clone();
    let name = &record.station.name;

    // A blank name is missing data, not a second identity.
    if doc.metadata.name.is_empty() {
        doc.metadata.name = name.clone();
    } else if !name.is_empty() && doc.metadata.name != *name {
        return Err(AggregationError::ConflictingStation {
            station: station_key,
            first: doc.metadata.name.clone(),
            other: name.clone(),
        });
    }
    if doc.metadata != record.station {
        debug!(
            station = %station_key,
            parameter = %record.parameter.key,
            "Station metadata differs within batch, keeping first seen"
        );
    }

    let Some(parameter) = doc.find_parameter_mut(&record.parameter.key) else {
        doc.parameters.push(record.parameter_block());
        return Ok(());
    };

    if parameter.unit != record.parameter.unit {
        return Err(AggregationError::ConflictingParameter {
            station: station_key,
            parameter: parameter.key.clone(),
            first: parameter.unit.clone(),
            other: record.parameter.unit.clone(),
        });
    }

    let block = record.period_block();
    match parameter
        .periods
        .iter_mut()
        .find(|p| p.matches(&block.key, block.from))
    {
        Some(existing) => {
            debug!(
                station = %station_key,
                parameter = %parameter.key,
                period = %block.key,
                from = %block.from,
                "Duplicate window in batch, later record replaces earlier"
            );
            *existing = block;
        }
        None => parameter.periods.push(block),
    }

    Ok(())
}
