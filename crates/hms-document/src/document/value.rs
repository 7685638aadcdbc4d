//! Value helpers shared by the query, expression and aggregation evaluators
//!
//! Documents are plain `serde_json::Value` trees. Dates use the extended-JSON
//! encoding `{"$date": <millis since epoch>}`; a `{"$date": "2025-03-21"}`
//! literal (RFC 3339 or `YYYY-MM-DD`) is accepted anywhere a date is read.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;

/// Key used for extended-JSON dates
pub const DATE_KEY: &str = "$date";

/// Milliseconds in one (non-leap) day
pub const MILLIS_PER_DAY: i64 = 1000 * 60 * 60 * 24;

/// Coarse type classes, ordered the way mixed-type sorts order them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeClass {
    /// Null or missing
    Null,
    /// Integer or floating point
    Number,
    /// UTF-8 string
    String,
    /// Embedded object
    Object,
    /// Array
    Array,
    /// Boolean
    Boolean,
    /// Extended-JSON date
    Date,
}

impl TypeClass {
    /// Lowercase name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
            Self::Boolean => "bool",
            Self::Date => "date",
        }
    }
}

/// Classify a value
pub fn type_class(value: &Value) -> TypeClass {
    match value {
        Value::Null => TypeClass::Null,
        Value::Bool(_) => TypeClass::Boolean,
        Value::Number(_) => TypeClass::Number,
        Value::String(_) => TypeClass::String,
        Value::Array(_) => TypeClass::Array,
        Value::Object(_) if as_date_millis(value).is_some() => TypeClass::Date,
        Value::Object(_) => TypeClass::Object,
    }
}

/// Build a date value from a UTC instant
pub fn date_value(instant: DateTime<Utc>) -> Value {
    millis_value(instant.timestamp_millis())
}

/// Build a date value from milliseconds since the Unix epoch
pub fn millis_value(millis: i64) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(DATE_KEY.to_string(), Value::Number(millis.into()));
    Value::Object(map)
}

/// Build a date value for midnight UTC of a calendar date
pub fn naive_date_value(date: NaiveDate) -> Value {
    millis_value(naive_date_millis(date))
}

/// Milliseconds since the epoch for midnight UTC of a calendar date
pub fn naive_date_millis(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Read a date value as milliseconds since the epoch
pub fn as_date_millis(value: &Value) -> Option<i64> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    match map.get(DATE_KEY)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => parse_instant(s).map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

/// Read a date value as a UTC instant
pub fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    as_date_millis(value).and_then(DateTime::from_timestamp_millis)
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC)
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Convert a number to the most natural JSON representation
///
/// Integral results stay integers so `$sum: 1` counts read as `3`, not `3.0`.
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number((n as i64).into())
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Truthiness used by `$cond`, `$filter` and the logical expression operators
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => true,
    }
}

/// Equality with numeric normalisation (`1 == 1.0`) and date awareness
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Object(_), Value::Object(_)) => match (as_date_millis(a), as_date_millis(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        _ => a == b,
    }
}

/// Total order over values: first by type class, then within the class
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (ca, cb) = (type_class(a), type_class(b));
    if ca != cb {
        return ca.cmp(&cb);
    }
    compare_same_class(a, b).unwrap_or(Ordering::Equal)
}

/// Compare two values of the same type class; `None` when the classes differ
pub fn compare_same_class(a: &Value, b: &Value) -> Option<Ordering> {
    match (type_class(a), type_class(b)) {
        (TypeClass::Null, TypeClass::Null) => Some(Ordering::Equal),
        (TypeClass::Number, TypeClass::Number) => {
            let (x, y) = (a.as_f64()?, b.as_f64()?);
            Some(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
        }
        (TypeClass::String, TypeClass::String) => Some(a.as_str()?.cmp(b.as_str()?)),
        (TypeClass::Boolean, TypeClass::Boolean) => Some(a.as_bool()?.cmp(&b.as_bool()?)),
        (TypeClass::Date, TypeClass::Date) => Some(as_date_millis(a)?.cmp(&as_date_millis(b)?)),
        (TypeClass::Array, TypeClass::Array) => {
            let (x, y) = (a.as_array()?, b.as_array()?);
            for (l, r) in x.iter().zip(y) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return Some(ord);
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        (TypeClass::Object, TypeClass::Object) => {
            // Objects order by their canonical serialisation
            let x = serde_json::to_string(a).ok()?;
            let y = serde_json::to_string(b).ok()?;
            Some(x.cmp(&y))
        }
        _ => None,
    }
}
