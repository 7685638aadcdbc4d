//! Doctor and department records

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::dates;

/// Day of the week, stored as its full English name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    /// Monday
    Monday,
    /// Tuesday
    Tuesday,
    /// Wednesday
    Wednesday,
    /// Thursday
    Thursday,
    /// Friday
    Friday,
    /// Saturday
    Saturday,
    /// Sunday
    Sunday,
}

impl Weekday {
    /// Full day name
    pub fn name(&self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hospital department, embedded in every doctor record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    /// Department ID
    pub department_id: String,
    /// Display name
    pub department_name: String,
    /// Soft-delete marker
    #[serde(with = "dates::flag", default)]
    pub is_deleted: bool,
}

/// Doctor attending an appointment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    /// Doctor ID
    pub doctor_id: String,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Speciality, e.g. "Neurologist"
    pub role: String,
    /// Phone number
    pub contact_number: String,
    /// Email address
    pub email: String,
    /// Days the doctor holds clinic
    pub available_days: BTreeSet<Weekday>,
    /// Soft-delete marker
    #[serde(with = "dates::flag", default)]
    pub is_deleted: bool,
    /// Owning department
    pub department: Department,
}

impl Doctor {
    /// "First Last"
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Whether the doctor holds clinic on the weekday of `date`
    pub fn is_available_on(&self, date: NaiveDate) -> bool {
        self.available_days.contains(&Weekday::from(date.weekday()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doctor() -> Doctor {
        serde_json::from_value(json!({
            "doctor_id": "doc004",
            "first_name": "Pooja",
            "last_name": "Pandit",
            "role": "Orthopedician",
            "contact_number": "(445)5667788",
            "email": "pooja.pandit@hospital.com",
            "available_days": ["Friday", "Wednesday"],
            "is_deleted": 0,
            "department": {
                "department_id": "dep004",
                "department_name": "Orthopedics",
                "is_deleted": 0
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_available_days_serialize_in_week_order() {
        let value = serde_json::to_value(doctor()).unwrap();
        assert_eq!(value["available_days"], json!(["Wednesday", "Friday"]));
        assert_eq!(value["is_deleted"], json!(false));
    }

    #[test]
    fn test_is_available_on() {
        let doc = doctor();
        // 2025-01-03 was a Friday
        assert!(doc.is_available_on(NaiveDate::from_ymd_opt(2025, 1, 3).unwrap()));
        assert!(!doc.is_available_on(NaiveDate::from_ymd_opt(2025, 1, 4).unwrap()));
        assert_eq!(doc.full_name(), "Pooja Pandit");
    }

    #[test]
    fn test_unknown_day_is_rejected() {
        let mut value = serde_json::to_value(doctor()).unwrap();
        value["available_days"] = json!(["Funday"]);
        assert!(serde_json::from_value::<Doctor>(value).is_err());
    }
}
