//! Serde adapters for document field encodings
//!
//! Dates are stored as extended-JSON `{"$date": <ms since epoch>}`. On input
//! the plain `YYYY-MM-DD` and RFC 3339 string forms are accepted too, so seed
//! files can be written by hand.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use hms_document::document::value::{as_datetime, naive_date_value, parse_instant};

/// Decode a document date value into a calendar date (UTC)
pub fn decode_date(value: &Value) -> Option<NaiveDate> {
    let instant = match value {
        Value::String(s) => parse_instant(s),
        other => as_datetime(other),
    };
    instant.map(|dt| dt.date_naive())
}

/// `#[serde(with = "dates::date")]` for [`NaiveDate`] fields
pub mod date {
    use super::*;
    use serde::de::Error as _;

    /// Serialize as an extended-JSON date
    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        naive_date_value(*date).serialize(serializer)
    }

    /// Deserialize from an extended-JSON date or a date string
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let value = Value::deserialize(deserializer)?;
        decode_date(&value).ok_or_else(|| D::Error::custom(format!("invalid date: {}", value)))
    }
}

/// `#[serde(with = "dates::flag")]` for soft-delete markers
///
/// Accepts booleans and the integers 0 and 1.
pub mod flag {
    use super::*;
    use serde::de::Error as _;

    /// Serialize as a boolean
    pub fn serialize<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(*flag)
    }

    /// Deserialize from a boolean or 0/1
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Bool(b) => Ok(b),
            Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
            Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
            other => Err(D::Error::custom(format!("invalid flag: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Row {
        #[serde(with = "date")]
        day: NaiveDate,
        #[serde(with = "flag")]
        gone: bool,
    }

    #[test]
    fn test_date_encodes_as_extended_json() {
        let row = Row {
            day: NaiveDate::from_ymd_opt(2025, 2, 14).unwrap(),
            gone: false,
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value, json!({ "day": { "$date": 1739491200000i64 }, "gone": false }));
    }

    #[test]
    fn test_date_accepts_string_forms() {
        let expected = NaiveDate::from_ymd_opt(2025, 2, 14).unwrap();
        for day in [
            json!("2025-02-14"),
            json!("2025-02-14T00:00:00Z"),
            json!({ "$date": "2025-02-14T00:00:00Z" }),
            json!({ "$date": 1739491200000i64 }),
        ] {
            let row: Row = serde_json::from_value(json!({ "day": day, "gone": 0 })).unwrap();
            assert_eq!(row.day, expected);
            assert!(!row.gone);
        }
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(serde_json::from_value::<Row>(json!({ "day": "14/02/2025", "gone": false })).is_err());
        assert!(serde_json::from_value::<Row>(json!({ "day": "2025-02-14", "gone": 2 })).is_err());
    }
}
