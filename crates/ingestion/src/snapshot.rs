//! Snapshot Record Reader.
//!
//! A snapshot is one station's single parameter over a single period, in
//! the provider's data document shape:
//!
//! ```json
//! {
//!   "station":   { "key": "188790", "name": "Abisko Aut", "owner": "SMHI", ... },
//!   "position":  [ { "latitude": 68.3538, "longitude": 18.8164, "height": 392.0 } ],
//!   "parameter": { "key": "1", "name": "Lufttemperatur", "summary": "...", "unit": "degree celsius" },
//!   "period":    { "key": "latest-hour", "from": 1704067200000, "to": 1704070800000, ... },
//!   "value":     [ { "date": 1704067200000, "value": "-12.4", "quality": "G" } ]
//! }
//! ```
//!
//! Everything the engine needs is validated here; downstream code works only
//! with [`SnapshotRecord`].

use chrono::{DateTime, SubsecRound, Utc};
use serde::Deserialize;

use station_common::{from_epoch_millis, ParameterBlock, PeriodBlock, Sample, StationMetadata};

use crate::error::ParseError;

/// Parameter description carried by a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    pub key: String,
    pub name: String,
    pub summary: String,
    pub unit: String,
}

/// Period description carried by a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodInfo {
    pub key: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub summary: String,
    pub sampling: String,
}

/// One station, one parameter, one period, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub station_key: String,
    pub station: StationMetadata,
    pub parameter: ParameterInfo,
    pub period: PeriodInfo,
    /// Samples in the order received
    pub values: Vec<Sample>,
}

impl SnapshotRecord {
    /// The period and its samples as a document block.
    pub fn period_block(&self) -> PeriodBlock {
        PeriodBlock {
            key: self.period.key.clone(),
            from: self.period.from,
            to: self.period.to,
            summary: self.period.summary.clone(),
            sampling: self.period.sampling.clone(),
            values: self.values.clone(),
        }
    }

    /// A parameter block holding exactly this record's period.
    pub fn parameter_block(&self) -> ParameterBlock {
        ParameterBlock {
            key: self.parameter.key.clone(),
            name: self.parameter.name.clone(),
            summary: self.parameter.summary.clone(),
            unit: self.parameter.unit.clone(),
            periods: vec![self.period_block()],
        }
    }
}

/// One unparsed snapshot and where it came from.
#[derive(Debug, Clone)]
pub struct SnapshotInput {
    /// File path or URL, used in reports
    pub origin: String,
    pub body: String,
}

impl SnapshotInput {
    pub fn new(origin: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            body: body.into(),
        }
    }
}

/// Parse a snapshot from JSON text.
pub fn parse_snapshot(body: &str) -> Result<SnapshotRecord, ParseError> {
    let raw: RawSnapshot = serde_json::from_str(body)?;
    raw.validate()
}

/// Parse a snapshot from an already decoded JSON value.
pub fn parse_snapshot_value(value: serde_json::Value) -> Result<SnapshotRecord, ParseError> {
    let raw: RawSnapshot = serde_json::from_value(value)?;
    raw.validate()
}

// ============================================================================
// Provider wire shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    station: Option<RawStation>,
    #[serde(default)]
    position: Option<Vec<RawPosition>>,
    parameter: Option<RawParameter>,
    period: Option<RawPeriod>,
    #[serde(default)]
    value: Option<Vec<RawSample>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStation {
    key: Option<RawKey>,
    name: Option<String>,
    owner: Option<String>,
    owner_category: Option<String>,
    measuring_stations: Option<String>,
    height: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    height: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawParameter {
    key: Option<RawKey>,
    name: Option<String>,
    summary: Option<String>,
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPeriod {
    key: Option<RawKey>,
    from: Option<RawInstant>,
    to: Option<RawInstant>,
    summary: Option<String>,
    sampling: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    date: Option<RawInstant>,
    value: Option<RawMeasurement>,
    quality: Option<String>,
}

/// Keys arrive as strings from the provider but as numbers from some exports.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawKey {
    Text(String),
    Number(i64),
}

impl RawKey {
    fn into_key(self) -> Option<String> {
        match self {
            RawKey::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            RawKey::Number(n) => Some(n.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInstant {
    Millis(i64),
    Text(String),
}

impl RawInstant {
    fn to_datetime(&self, field: &str) -> Result<DateTime<Utc>, ParseError> {
        let parsed = match self {
            RawInstant::Millis(millis) => from_epoch_millis(*millis),
            // Stored instants have millisecond precision; finer digits would
            // make the same window compare unequal after a round-trip.
            RawInstant::Text(text) => DateTime::parse_from_rfc3339(text.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(3)),
        };
        parsed.ok_or_else(|| ParseError::InvalidTimestamp {
            field: field.to_string(),
            value: match self {
                RawInstant::Millis(millis) => millis.to_string(),
                RawInstant::Text(text) => text.clone(),
            },
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMeasurement {
    Text(String),
    Number(f64),
}

impl RawMeasurement {
    fn into_text(self) -> String {
        match self {
            RawMeasurement::Text(s) => s,
            RawMeasurement::Number(n) => n.to_string(),
        }
    }
}

impl RawSnapshot {
    fn validate(self) -> Result<SnapshotRecord, ParseError> {
        let station = self.station.ok_or(ParseError::MissingField("station"))?;
        let station_key = station
            .key
            .and_then(RawKey::into_key)
            .ok_or(ParseError::MissingField("station.key"))?;

        let parameter = self.parameter.ok_or(ParseError::MissingField("parameter"))?;
        let parameter_key = parameter
            .key
            .and_then(RawKey::into_key)
            .ok_or(ParseError::MissingField("parameter.key"))?;

        let period = self.period.ok_or(ParseError::MissingField("period"))?;
        let period_key = period
            .key
            .and_then(RawKey::into_key)
            .ok_or(ParseError::MissingField("period.key"))?;
        let from = period
            .from
            .as_ref()
            .ok_or(ParseError::MissingField("period.from"))?
            .to_datetime("period.from")?;
        let to = match &period.to {
            Some(instant) => instant.to_datetime("period.to")?,
            None => from,
        };

        // The latest position wins over coordinates on the station itself.
        let position = self.position.and_then(|mut p| p.pop());
        let (height, latitude, longitude) = match position {
            Some(p) => (
                p.height.or(station.height),
                p.latitude.or(station.latitude),
                p.longitude.or(station.longitude),
            ),
            None => (station.height, station.latitude, station.longitude),
        };

        let values = self
            .value
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, sample)| -> Result<Sample, ParseError> {
                let field = format!("value[{}].date", i);
                let timestamp = sample
                    .date
                    .as_ref()
                    .ok_or_else(|| ParseError::InvalidTimestamp {
                        field: field.clone(),
                        value: "missing".to_string(),
                    })?
                    .to_datetime(&field)?;
                Ok(Sample {
                    timestamp,
                    measurement: sample.value.map(RawMeasurement::into_text).unwrap_or_default(),
                    quality: sample.quality.unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(SnapshotRecord {
            station_key,
            station: StationMetadata {
                name: station.name.unwrap_or_default(),
                owner: station.owner.unwrap_or_default(),
                owner_category: station.owner_category.unwrap_or_default(),
                measuring_stations: station.measuring_stations.unwrap_or_default(),
                height,
                latitude,
                longitude,
            },
            parameter: ParameterInfo {
                key: parameter_key,
                name: parameter.name.unwrap_or_default(),
                summary: parameter.summary.unwrap_or_default(),
                unit: parameter.unit.unwrap_or_default(),
            },
            period: PeriodInfo {
                key: period_key,
                from,
                to,
                summary: period.summary.unwrap_or_default(),
                sampling: period.sampling.unwrap_or_default(),
            },
            values,
        })
    }
}
