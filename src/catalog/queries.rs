//! Filter queries over the appointments collection
//!
//! Every projection keeps `_id` unless it says otherwise.

use serde_json::json;

use super::{CatalogEntry, Operation};

/// 2025-05-09T00:00:00Z
const UPCOMING_CUTOFF_MS: i64 = 1_746_748_800_000;

/// One 365-day year in milliseconds
const MS_PER_YEAR: i64 = 1000 * 60 * 60 * 24 * 365;

pub(super) fn find_queries() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new(
            "find-01",
            "Patients whose first name starts with 'R'",
            "Alphabetical outreach groups for follow-up",
            Operation::Find {
                filter: json!({ "patient.first_name": { "$regex": "^R", "$options": "i" } }),
                projection: json!({
                    "patient.first_name": 1,
                    "patient.last_name": 1,
                    "patient.gender": 1
                }),
            },
        ),
        CatalogEntry::new(
            "find-02",
            "Appointments billing a medicine with quantity > 1",
            "Review high-consumption visits for billing and inventory",
            Operation::Find {
                filter: json!({ "billing.medicines": { "$elemMatch": { "quantity": { "$gt": 1 } } } }),
                projection: json!({ "appointment_id": 1, "billing.medicines.$": 1 }),
            },
        ),
        CatalogEntry::new(
            "find-03",
            "Completed appointments for female patients",
            "Gender-specific treatment statistics and follow-up",
            Operation::Find {
                filter: json!({ "status": "Completed", "patient.gender": "Female" }),
                projection: json!({
                    "appointment_id": 1,
                    "patient.first_name": 1,
                    "patient.last_name": 1,
                    "status": 1
                }),
            },
        ),
        CatalogEntry::new(
            "find-04",
            "Ibuprofen prescriptions with the matching medicine line",
            "Track analgesic usage for supply forecasting",
            Operation::Find {
                filter: json!({ "billing.medicines.medicine_name": "Ibuprofen" }),
                projection: json!({ "appointment_id": 1, "billing.medicines.$": 1 }),
            },
        ),
        CatalogEntry::new(
            "find-05",
            "Appointments neither completed nor cancelled",
            "Upcoming or in-progress visits needing staff or reminders",
            Operation::Find {
                filter: json!({ "$nor": [ { "status": "Completed" }, { "status": "Cancelled" } ] }),
                projection: json!({ "appointment_id": 1, "status": 1 }),
            },
        ),
        CatalogEntry::new(
            "find-06",
            "Appointments in the Neurology department",
            "Department workload reports",
            Operation::Find {
                filter: json!({ "doctor.department.department_name": "Neurology" }),
                projection: json!({
                    "appointment_id": 1,
                    "doctor.first_name": 1,
                    "doctor.last_name": 1,
                    "doctor.department": 1
                }),
            },
        ),
        CatalogEntry::new(
            "find-07",
            "Doctors whose appointments billed no medicines",
            "Spot consultations without pharmacy orders",
            Operation::Find {
                filter: no_medicines_filter(),
                projection: no_medicines_projection(),
            },
        ),
        CatalogEntry::new(
            "find-08",
            "Patients not named Alice or John",
            "Exclusion list for bulk communications",
            Operation::Find {
                filter: json!({
                    "$nor": [ { "patient.first_name": "Alice" }, { "patient.first_name": "John" } ]
                }),
                projection: json!({ "patient.first_name": 1 }),
            },
        ),
        CatalogEntry::new(
            "find-09",
            "Appointments after 2025-05-09",
            "Surface upcoming visits",
            Operation::Find {
                filter: json!({ "appointment_date": { "$gt": { "$date": UPCOMING_CUTOFF_MS } } }),
                projection: json!({ "appointment_id": 1, "appointment_date": 1, "appointment_time": 1 }),
            },
        ),
        CatalogEntry::new(
            "find-10",
            "Patients with both a primary and an emergency contact number",
            "Safety protocol contact verification",
            Operation::Find {
                filter: json!({
                    "patient.contact_number": { "$exists": true },
                    "patient.emergency_contact_number": { "$exists": true }
                }),
                projection: json!({
                    "patient.patient_id": 1,
                    "patient.contact_number": 1,
                    "patient.emergency_contact_number": 1
                }),
            },
        ),
        CatalogEntry::new(
            "find-11",
            "Appointments billed over 100",
            "High-value visits for financial audit",
            Operation::Find {
                filter: json!({ "billing.total_amount": { "$gt": 100 } }),
                projection: json!({ "appointment_id": 1, "billing.total_amount": 1 }),
            },
        ),
        CatalogEntry::new(
            "find-12",
            "Appointments with doctors available on Friday",
            "End-of-week staffing and room allocation",
            Operation::Find {
                filter: json!({ "doctor.available_days": "Friday" }),
                projection: json!({ "appointment_id": 1, "doctor.doctor_id": 1, "doctor.available_days": 1 }),
            },
        ),
        CatalogEntry::new(
            "find-13",
            "Patients over 40 at the time of the appointment",
            "Targeted health screening",
            Operation::Find {
                filter: json!({
                    "$expr": {
                        "$gt": [
                            { "$divide": [
                                { "$subtract": [ "$appointment_date", "$patient.date_of_birth" ] },
                                MS_PER_YEAR
                            ] },
                            40
                        ]
                    }
                }),
                projection: json!({
                    "appointment_id": 1,
                    "patient.first_name": 1,
                    "patient.last_name": 1,
                    "patient.date_of_birth": 1,
                    "appointment_date": 1
                }),
            },
        ),
        CatalogEntry::new(
            "find-14",
            "Patients living in Seattle",
            "Regional health campaign planning",
            Operation::Find {
                filter: json!({ "patient.address": { "$regex": "Seattle", "$options": "i" } }),
                projection: json!({ "patient.first_name": 1, "patient.last_name": 1, "patient.address": 1 }),
            },
        ),
        CatalogEntry::new(
            "find-15",
            "Appointments that billed no medicines",
            "Spot consultations without pharmacy orders",
            Operation::Find {
                filter: no_medicines_filter(),
                projection: no_medicines_projection(),
            },
        ),
    ]
}

fn no_medicines_filter() -> serde_json::Value {
    json!({
        "$or": [
            { "billing": null },
            { "billing.medicines": { "$exists": true, "$size": 0 } }
        ]
    })
}

fn no_medicines_projection() -> serde_json::Value {
    json!({
        "appointment_id": 1,
        "doctor.doctor_id": 1,
        "doctor.first_name": 1,
        "doctor.last_name": 1,
        "billing": 1
    })
}
