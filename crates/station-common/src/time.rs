//! Time handling for provider timestamps.
//!
//! The observation API encodes every instant as integer milliseconds since
//! the Unix epoch. Documents keep `DateTime<Utc>` in memory and the same
//! integer form on the wire.

use chrono::{DateTime, TimeZone, Utc};

/// Convert epoch milliseconds to a UTC instant.
///
/// Returns `None` when the value is outside chrono's representable range.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Serde adapter for `DateTime<Utc>` stored as epoch milliseconds.
///
/// ```
/// use chrono::{DateTime, Utc};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Stamp {
///     #[serde(with = "station_common::epoch_millis")]
///     at: DateTime<Utc>,
/// }
///
/// let stamp: Stamp = serde_json::from_str(r#"{"at":1704067200000}"#).unwrap();
/// assert_eq!(stamp.at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
/// ```
pub mod epoch_millis {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(value.timestamp_millis())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = i64::deserialize(deserializer)?;
        super::from_epoch_millis(millis)
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", millis)))
    }
}
