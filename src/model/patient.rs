//! Patient and insurance records

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::dates;

/// Insurance policy held by a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insurance {
    /// Insurance ID
    pub insurance_id: String,
    /// Policy number
    pub policy_number: String,
    /// Maximum covered amount
    pub coverage_amount: f64,
    /// Policy expiry
    #[serde(with = "dates::date")]
    pub expiry_date: NaiveDate,
    /// Soft-delete marker
    #[serde(with = "dates::flag", default)]
    pub is_deleted: bool,
}

/// Patient, copied into every appointment they attend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Patient ID
    pub patient_id: String,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Date of birth
    #[serde(with = "dates::date")]
    pub date_of_birth: NaiveDate,
    /// Gender
    pub gender: String,
    /// Phone number
    pub contact_number: String,
    /// Postal address, city and state included
    pub address: String,
    /// Email address
    pub email: String,
    /// Emergency contact name
    pub emergency_contact_name: String,
    /// Emergency contact phone number
    pub emergency_contact_number: String,
    /// Insurance policies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurances: Option<Vec<Insurance>>,
    /// Soft-delete marker
    #[serde(with = "dates::flag", default)]
    pub is_deleted: bool,
}

impl Patient {
    /// "First Last"
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Insurance policies, empty when absent
    pub fn insurances(&self) -> &[Insurance] {
        self.insurances.as_deref().unwrap_or_default()
    }

    /// Age in 365-day years on `on`
    pub fn age_on(&self, on: NaiveDate) -> f64 {
        (on - self.date_of_birth).num_days() as f64 / 365.0
    }
}
