//! Shared fixtures for ingestion integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use ingestion::SnapshotInput;

pub const STATION: &str = "188790";

/// Midnight UTC on the given day of January 2024.
pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
}

/// A provider snapshot for one station/parameter/window.
pub fn snapshot(station: &str, parameter: &str, from_day: u32, value: &str) -> serde_json::Value {
    let from = day(from_day).timestamp_millis();
    json!({
        "station": {
            "key": station,
            "name": format!("Station {}", station),
            "owner": "SMHI",
            "ownerCategory": "CLIMATE",
            "measuringStations": "CORE",
            "height": 392.0
        },
        "position": [{ "height": 392.0, "latitude": 68.3538, "longitude": 18.8164 }],
        "parameter": {
            "key": parameter,
            "name": format!("Parameter {}", parameter),
            "summary": "momentanvärde, 1 gång/tim",
            "unit": "degree celsius"
        },
        "period": {
            "key": "latest-hour",
            "from": from,
            "to": from + 3_600_000,
            "summary": "Data från senaste timmen",
            "sampling": "1 timme"
        },
        "value": [{ "date": from, "value": value, "quality": "G" }]
    })
}

pub fn input(value: serde_json::Value) -> SnapshotInput {
    SnapshotInput::new("test", value.to_string())
}
