//! Billing and medicine records

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::dates;

/// Payment state of a bill; unknown states are kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    /// Settled
    Paid,
    /// Awaiting payment
    Pending,
    /// Any other state
    Other(String),
}

impl From<String> for PaymentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Paid" => PaymentStatus::Paid,
            "Pending" => PaymentStatus::Pending,
            _ => PaymentStatus::Other(s),
        }
    }
}

impl From<PaymentStatus> for String {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Paid => "Paid".to_string(),
            PaymentStatus::Pending => "Pending".to_string(),
            PaymentStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Paid => f.write_str("Paid"),
            PaymentStatus::Pending => f.write_str("Pending"),
            PaymentStatus::Other(s) => f.write_str(s),
        }
    }
}

/// A dispensed medicine line on a bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    /// Medicine ID
    pub medicine_id: String,
    /// Product name
    pub medicine_name: String,
    /// Units dispensed, at least 1
    pub quantity: u32,
    /// Price per unit
    pub unit_price: f64,
    /// Supplier name
    pub supplier: String,
    /// Batch expiry
    #[serde(with = "dates::date")]
    pub expiry_date: NaiveDate,
    /// Soft-delete marker
    #[serde(with = "dates::flag", default)]
    pub is_deleted: bool,
}

impl Medicine {
    /// Whether the batch expires in `(from, from + days]`
    pub fn expires_within(&self, from: NaiveDate, days: i64) -> bool {
        let remaining = (self.expiry_date - from).num_days();
        remaining > 0 && remaining <= days
    }
}

/// Bill raised for an appointment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Billing {
    /// Bill ID
    pub bill_id: String,
    /// Amount charged
    pub total_amount: f64,
    /// Payment state
    pub payment_status: PaymentStatus,
    /// Soft-delete marker
    #[serde(with = "dates::flag", default)]
    pub is_deleted: bool,
    /// Dispensed medicines; an absent list reads as empty and is stored as `[]`
    #[serde(default)]
    pub medicines: Vec<Medicine>,
}

impl Billing {
    /// Whether at least one medicine was dispensed
    pub fn has_medicines(&self) -> bool {
        !self.medicines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn billing(medicines: serde_json::Value) -> Billing {
        let mut value = json!({
            "bill_id": "b001",
            "total_amount": 257.99,
            "payment_status": "Paid",
            "is_deleted": false
        });
        if !medicines.is_null() {
            value["medicines"] = medicines;
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_absent_and_empty_medicines_are_equivalent() {
        let absent = billing(serde_json::Value::Null);
        let empty = billing(json!([]));
        assert_eq!(absent, empty);
        assert!(!absent.has_medicines());

        let value = serde_json::to_value(&absent).unwrap();
        assert_eq!(value["medicines"], json!([]));
    }

    #[test]
    fn test_medicine_expiry_window() {
        let bill = billing(json!([{
            "medicine_id": "m001",
            "medicine_name": "Paracetamol",
            "quantity": 2,
            "unit_price": 10.0,
            "supplier": "MediCorp",
            "expiry_date": "2026-01-01",
            "is_deleted": 0
        }]));
        let med = &bill.medicines[0];

        let from = NaiveDate::from_ymd_opt(2025, 11, 15).unwrap();
        assert!(med.expires_within(from, 60));
        assert!(!med.expires_within(from, 30));
        assert!(!med.expires_within(NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(), 60));
    }

    #[test]
    fn test_payment_status_keeps_unknown_values() {
        let status: PaymentStatus = serde_json::from_value(json!("Refunded")).unwrap();
        assert_eq!(status, PaymentStatus::Other("Refunded".into()));
        assert_eq!(serde_json::to_value(&status).unwrap(), json!("Refunded"));
        assert_eq!(serde_json::to_value(PaymentStatus::Paid).unwrap(), json!("Paid"));
    }
}
