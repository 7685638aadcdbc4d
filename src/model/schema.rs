//! Field paths of the appointment document shape
//!
//! Derived from a fully populated appointment so every optional branch
//! (billing, medicines, insurances) contributes its paths.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use hms_document::document::document::{field_paths, ID_FIELD};

use super::appointment::{Appointment, AppointmentStatus};
use super::billing::{Billing, Medicine, PaymentStatus};
use super::doctor::{Department, Doctor, Weekday};
use super::patient::{Insurance, Patient};
use crate::error::Result;

/// Every field path an appointment document can carry, `_id` included
pub fn appointment_paths() -> Result<BTreeSet<String>> {
    let document = sample().to_document()?;
    let mut paths: BTreeSet<String> = field_paths(&document).into_iter().collect();
    paths.insert(ID_FIELD.to_string());
    Ok(paths)
}

/// Whether `path` names a field of the appointment shape
pub fn is_known_path(paths: &BTreeSet<String>, path: &str) -> bool {
    paths.contains(path)
}

fn sample() -> Appointment {
    let day = NaiveDate::default();
    Appointment {
        appointment_id: String::new(),
        appointment_date: day,
        appointment_time: String::new(),
        status: AppointmentStatus::Scheduled,
        diagnosis: Some(String::new()),
        prescription: Some(String::new()),
        is_deleted: false,
        patient: Patient {
            patient_id: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            date_of_birth: day,
            gender: String::new(),
            contact_number: String::new(),
            address: String::new(),
            email: String::new(),
            emergency_contact_name: String::new(),
            emergency_contact_number: String::new(),
            insurances: Some(vec![Insurance {
                insurance_id: String::new(),
                policy_number: String::new(),
                coverage_amount: 0.0,
                expiry_date: day,
                is_deleted: false,
            }]),
            is_deleted: false,
        },
        doctor: Doctor {
            doctor_id: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            role: String::new(),
            contact_number: String::new(),
            email: String::new(),
            available_days: [Weekday::Monday].into_iter().collect(),
            is_deleted: false,
            department: Department {
                department_id: String::new(),
                department_name: String::new(),
                is_deleted: false,
            },
        },
        billing: Some(Billing {
            bill_id: String::new(),
            total_amount: 0.0,
            payment_status: PaymentStatus::Paid,
            is_deleted: false,
            medicines: vec![Medicine {
                medicine_id: String::new(),
                medicine_name: String::new(),
                quantity: 1,
                unit_price: 0.0,
                supplier: String::new(),
                expiry_date: day,
                is_deleted: false,
            }],
        }),
    }
}
