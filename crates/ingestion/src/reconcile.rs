//! Reconciler.
//!
//! Compares a freshly aggregated document with the persisted one and
//! describes the additive change between them. Nothing here touches the
//! store.
//!
//! Already-ingested windows are immutable: a period whose `(key, from)` is
//! already stored produces no operation, even if its samples differ.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use station_common::{AppendOp, MetadataUpdate, ParameterBlock, PeriodBlock, StationDocument};

/// Declarative change for one station.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeSet {
    /// The station is not stored yet
    Insert(StationDocument),
    /// Overwrite metadata and append what is new
    Update {
        metadata: MetadataUpdate,
        appends: Vec<AppendOp>,
    },
}

impl ChangeSet {
    /// Number of append operations (0 for an insert).
    pub fn append_count(&self) -> usize {
        match self {
            ChangeSet::Insert(_) => 0,
            ChangeSet::Update { appends, .. } => appends.len(),
        }
    }

    /// True for an update that only refreshes metadata.
    pub fn is_noop(&self) -> bool {
        matches!(self, ChangeSet::Update { appends, .. } if appends.is_empty())
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, ChangeSet::Insert(_))
    }
}

/// Reconcile against the current time.
pub fn reconcile(fresh: &StationDocument, existing: Option<&StationDocument>) -> ChangeSet {
    reconcile_at(fresh, existing, Utc::now())
}

/// Reconcile `fresh` against `existing`, stamping `last_updated` with `now`.
pub fn reconcile_at(
    fresh: &StationDocument,
    existing: Option<&StationDocument>,
    now: DateTime<Utc>,
) -> ChangeSet {
    let Some(existing) = existing else {
        let mut doc = fresh.clone();
        doc.last_updated = now;
        doc.parameters = merge_parameters(&fresh.parameters);
        return ChangeSet::Insert(doc);
    };

    // (parameter key) -> stored window keys.
    let stored: HashMap<&str, HashSet<(&str, DateTime<Utc>)>> = existing
        .parameters
        .iter()
        .map(|p| (p.key.as_str(), p.periods.iter().map(PeriodBlock::dedup_key).collect()))
        .collect();

    let mut appends = Vec::new();
    // Window already queued for append -> its index in `appends`.
    let mut pending: HashMap<(&str, &str, DateTime<Utc>), usize> = HashMap::new();
    let mut new_parameters: Vec<ParameterBlock> = Vec::new();

    for parameter in &fresh.parameters {
        let Some(windows) = stored.get(parameter.key.as_str()) else {
            new_parameters.push(parameter.clone());
            continue;
        };
        for period in &parameter.periods {
            if windows.contains(&period.dedup_key()) {
                continue;
            }
            let op = AppendOp::AppendPeriod {
                parameter_key: parameter.key.clone(),
                period: period.clone(),
            };
            match pending.get(&(parameter.key.as_str(), period.key.as_str(), period.from)) {
                Some(&i) => appends[i] = op,
                None => {
                    pending.insert(
                        (parameter.key.as_str(), period.key.as_str(), period.from),
                        appends.len(),
                    );
                    appends.push(op);
                }
            }
        }
    }

    appends.extend(
        merge_parameters(&new_parameters)
            .into_iter()
            .map(AppendOp::AppendParameter),
    );

    ChangeSet::Update {
        metadata: MetadataUpdate {
            metadata: fresh.metadata.clone(),
            last_updated: now,
        },
        appends,
    }
}

/// Collapse repeated parameter keys and repeated windows, later wins.
fn merge_parameters(parameters: &[ParameterBlock]) -> Vec<ParameterBlock> {
    let mut merged: Vec<ParameterBlock> = Vec::with_capacity(parameters.len());
    for parameter in parameters {
        let target = match merged.iter().position(|p| p.key == parameter.key) {
            Some(i) => &mut merged[i],
            None => {
                merged.push(ParameterBlock {
                    periods: Vec::new(),
                    ..parameter.clone()
                });
                let last = merged.len() - 1;
                &mut merged[last]
            }
        };
        for period in &parameter.periods {
            match target
                .periods
                .iter_mut()
                .find(|p| p.matches(&period.key, period.from))
            {
                Some(existing) => *existing = period.clone(),
                None => target.periods.push(period.clone()),
            }
        }
    }
    merged
}
