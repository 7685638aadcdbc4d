//! Shared test utilities for HMS integration tests.
//!
//! Import via `mod common;` in integration test files:
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```
#![allow(dead_code)]

use serde_json::Value;

use hms::config::Config;
use hms::model::Appointment;
use hms::records::HospitalRecords;

/// Reference instant used by every catalog test
pub const NOW: &str = "2025-05-09";

/// A `Config` pinned to [`NOW`]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.evaluation.reference_time = Some(NOW.to_string());
    config
}

/// Records loaded with the built-in fixture
pub fn seeded() -> HospitalRecords {
    HospitalRecords::open(&test_config()).unwrap()
}

/// Records loaded with the given appointments
pub fn seeded_with(config: &Config, appointments: &[Appointment]) -> HospitalRecords {
    let records = HospitalRecords::new(config).unwrap();
    records.load(appointments).unwrap();
    records
}

/// Run a catalog entry and collect its output
pub fn run(records: &HospitalRecords, id: &str) -> Vec<Value> {
    records.run(id).unwrap().collect()
}

/// `appointment_id` of each result, in order
pub fn appointment_ids(docs: &[Value]) -> Vec<&str> {
    docs.iter()
        .map(|d| d["appointment_id"].as_str().unwrap())
        .collect()
}

/// `_id` of each result, as strings, in order
pub fn group_keys(docs: &[Value]) -> Vec<String> {
    docs.iter()
        .map(|d| match &d["_id"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}

/// Assert two floats agree to within a cent
pub fn assert_amount(actual: &Value, expected: f64) {
    let actual = actual.as_f64().unwrap();
    assert!(
        (actual - expected).abs() < 0.005,
        "expected {}, got {}",
        expected,
        actual
    );
}
