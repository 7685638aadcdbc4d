//! Appointment, the root document of the `appointments` collection

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::billing::Billing;
use super::dates;
use super::doctor::Doctor;
use super::patient::Patient;
use crate::error::Result;

/// Appointment state; unknown states are kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppointmentStatus {
    /// Booked, not yet held
    Scheduled,
    /// Held
    Completed,
    /// Unbooked visit
    WalkIn,
    /// Called off
    Cancelled,
    /// Any other state
    Other(String),
}

impl AppointmentStatus {
    /// Stored representation
    pub fn as_str(&self) -> &str {
        match self {
            AppointmentStatus::Scheduled => "Scheduled",
            AppointmentStatus::Completed => "Completed",
            AppointmentStatus::WalkIn => "Walk-In",
            AppointmentStatus::Cancelled => "Cancelled",
            AppointmentStatus::Other(s) => s,
        }
    }
}

impl From<String> for AppointmentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Scheduled" => AppointmentStatus::Scheduled,
            "Completed" => AppointmentStatus::Completed,
            "Walk-In" => AppointmentStatus::WalkIn,
            "Cancelled" => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Other(s),
        }
    }
}

impl From<AppointmentStatus> for String {
    fn from(status: AppointmentStatus) -> Self {
        match status {
            AppointmentStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A patient visit with its doctor and (optionally) its bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    /// Appointment ID, unique within the collection
    pub appointment_id: String,
    /// Visit date
    #[serde(with = "dates::date")]
    pub appointment_date: NaiveDate,
    /// Visit time, `HH:MM:SS`
    pub appointment_time: String,
    /// Appointment state
    pub status: AppointmentStatus,
    /// Diagnosis, once made
    #[serde(default)]
    pub diagnosis: Option<String>,
    /// Prescription, once written
    #[serde(default)]
    pub prescription: Option<String>,
    /// Soft-delete marker
    #[serde(with = "dates::flag", default)]
    pub is_deleted: bool,
    /// Patient seen
    pub patient: Patient,
    /// Attending doctor
    pub doctor: Doctor,
    /// Bill, absent until one is raised
    #[serde(default)]
    pub billing: Option<Billing>,
}

impl Appointment {
    /// Encode as a store document
    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a store document; `_id` and unknown fields are ignored
    pub fn from_document(document: Value) -> Result<Self> {
        Ok(serde_json::from_value(document)?)
    }

    /// Whether the visit dispensed any medicine
    pub fn has_medicines(&self) -> bool {
        self.billing.as_ref().is_some_and(Billing::has_medicines)
    }

    /// Patient age at the visit in 365-day years
    pub fn patient_age(&self) -> f64 {
        self.patient.age_on(self.appointment_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trips_known_and_unknown_values() {
        for (raw, status) in [
            ("Walk-In", AppointmentStatus::WalkIn),
            ("Scheduled", AppointmentStatus::Scheduled),
            ("No-Show", AppointmentStatus::Other("No-Show".into())),
        ] {
            let parsed: AppointmentStatus = serde_json::from_value(json!(raw)).unwrap();
            assert_eq!(parsed, status);
            assert_eq!(serde_json::to_value(&parsed).unwrap(), json!(raw));
        }
    }

    #[test]
    fn test_document_round_trip_keeps_null_billing() {
        let appointment = crate::fixtures::seed_appointments()
            .unwrap()
            .into_iter()
            .find(|a| a.appointment_id == "a001")
            .unwrap();

        let mut doc = appointment.to_document().unwrap();
        assert_eq!(doc["billing"], Value::Null);
        assert_eq!(doc["diagnosis"], Value::Null);
        assert_eq!(doc["appointment_date"], json!({ "$date": 1764633600000i64 }));

        doc["_id"] = json!("ignored");
        let back = Appointment::from_document(doc).unwrap();
        assert_eq!(back, appointment);
        assert!(!back.has_medicines());
    }

    #[test]
    fn test_patient_age() {
        let appointments = crate::fixtures::seed_appointments().unwrap();
        let age = |id: &str| {
            appointments
                .iter()
                .find(|a| a.appointment_id == id)
                .map(Appointment::patient_age)
                .unwrap()
        };
        assert!((age("a003") - 32.66).abs() < 0.01);
        assert!((age("a005") - 46.65).abs() < 0.01);
    }
}
