//! Aggregation pipelines over the appointments collection

use serde_json::json;

use super::{CatalogEntry, CatalogSettings, Operation};

/// 2024-05-01T00:00:00Z
const TREND_START_MS: i64 = 1_714_521_600_000;
/// 2025-05-01T00:00:00Z
const TREND_END_MS: i64 = 1_746_057_600_000;

const MS_PER_DAY: i64 = 1000 * 60 * 60 * 24;

pub(super) fn pipelines(settings: &CatalogSettings) -> Vec<CatalogEntry> {
    let expiry_window_ms = settings.expiry_window_days.saturating_mul(MS_PER_DAY);

    vec![
        CatalogEntry::new(
            "agg-01",
            "Appointments per doctor",
            "Balance physician workloads",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$match": { "doctor.doctor_id": { "$exists": true } } }),
                    json!({ "$group": {
                        "_id": "$doctor.doctor_id",
                        "doctor_name": { "$first": "$doctor.first_name" },
                        "totalAppointments": { "$sum": 1 }
                    } }),
                ],
            },
        ),
        CatalogEntry::new(
            "agg-02",
            "Prescribed medicines per patient",
            "Consolidated medication history for chart review",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$unwind": "$billing.medicines" }),
                    json!({ "$group": {
                        "_id": "$patient.patient_id",
                        "patient_name": { "$first": "$patient.first_name" },
                        "prescribed_medicines": { "$push": "$billing.medicines.medicine_name" }
                    } }),
                ],
            },
        ),
        CatalogEntry::new(
            "agg-03",
            "Paid bills with patient name, medicine count and amount",
            "Revenue reconciliation for closed payments",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$match": { "billing.payment_status": "Paid" } }),
                    json!({ "$project": {
                        "patient_full_name": { "$concat": ["$patient.first_name", " ", "$patient.last_name"] },
                        "med_count": { "$size": { "$ifNull": ["$billing.medicines", []] } },
                        "total_bill_amount": "$billing.total_amount"
                    } }),
                ],
            },
        ),
        CatalogEntry::new(
            "agg-04",
            "Top 3 medicines by quantity dispensed",
            "Procurement planning for high-demand drugs",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$unwind": "$billing.medicines" }),
                    json!({ "$group": {
                        "_id": "$billing.medicines.medicine_name",
                        "prescriptionCount": { "$sum": "$billing.medicines.quantity" }
                    } }),
                    json!({ "$sort": { "prescriptionCount": -1 } }),
                    json!({ "$limit": 3 }),
                ],
            },
        ),
        CatalogEntry::new(
            "agg-05",
            "Medicines expiring within the configured window, per appointment",
            "Flag soon-to-expire stock for restocking and patient safety",
            Operation::Aggregate {
                pipeline: vec![json!({ "$project": {
                    "appointment_id": 1,
                    "expiring_medicines": {
                        "$filter": {
                            "input": { "$ifNull": ["$billing.medicines", []] },
                            "as": "med",
                            "cond": {
                                "$and": [
                                    { "$gt": ["$$med.expiry_date", "$$NOW"] },
                                    { "$lte": ["$$med.expiry_date", { "$add": ["$$NOW", expiry_window_ms] }] }
                                ]
                            }
                        }
                    }
                } })],
            },
        ),
        CatalogEntry::new(
            "agg-06",
            "Average medicines per appointment",
            "Detect unusually low or high prescribing rates",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$project": { "medCount": { "$size": { "$ifNull": ["$billing.medicines", []] } } } }),
                    json!({ "$group": { "_id": null, "avgMedsPerAppointment": { "$avg": "$medCount" } } }),
                ],
            },
        ),
        CatalogEntry::new(
            "agg-07",
            "Appointments with no medicines prescribed",
            "Non-pharmacological treatments or data gaps",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$match": { "$or": [ { "billing": null }, { "billing.medicines": { "$size": 0 } } ] } }),
                    json!({ "$project": { "appointment_id": 1, "status": 1, "billing": 1 } }),
                ],
            },
        ),
        CatalogEntry::new(
            "agg-08",
            "Departments with appointments",
            "Directory of active care units",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$group": { "_id": "$doctor.department.department_name" } }),
                    json!({ "$sort": { "_id": 1 } }),
                ],
            },
        ),
        CatalogEntry::new(
            "agg-09",
            "Monthly appointment volume, May 2024 to April 2025",
            "Seasonal staffing and resource planning",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$match": { "appointment_date": {
                        "$gte": { "$date": TREND_START_MS },
                        "$lt": { "$date": TREND_END_MS }
                    } } }),
                    json!({ "$group": {
                        "_id": { "$dateToString": { "format": "%Y-%m", "date": "$appointment_date" } },
                        "count": { "$sum": 1 }
                    } }),
                    json!({ "$sort": { "_id": 1 } }),
                ],
            },
        ),
        CatalogEntry::new(
            "agg-10",
            "Revenue by department",
            "Departmental budget allocation",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$match": { "billing.total_amount": { "$exists": true } } }),
                    json!({ "$group": {
                        "_id": "$doctor.department.department_name",
                        "revenue": { "$sum": "$billing.total_amount" }
                    } }),
                    json!({ "$sort": { "revenue": -1 } }),
                ],
            },
        ),
        CatalogEntry::new(
            "agg-11",
            "Top 5 patients by visits",
            "Care management for frequent visitors",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$group": {
                        "_id": "$patient.patient_id",
                        "patient_name": { "$first": { "$concat": ["$patient.first_name", " ", "$patient.last_name"] } },
                        "visits": { "$sum": 1 }
                    } }),
                    json!({ "$sort": { "visits": -1 } }),
                    json!({ "$limit": 5 }),
                ],
            },
        ),
        CatalogEntry::new(
            "agg-12",
            "Average bill per doctor",
            "Benchmark physician billing patterns",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$match": { "billing.total_amount": { "$exists": true } } }),
                    json!({ "$group": {
                        "_id": "$doctor.doctor_id",
                        "doctor_name": { "$first": "$doctor.first_name" },
                        "avgBilling": { "$avg": "$billing.total_amount" }
                    } }),
                    json!({ "$sort": { "avgBilling": -1 } }),
                ],
            },
        ),
        CatalogEntry::new(
            "agg-13",
            "Appointments per department",
            "Workload distribution across departments",
            Operation::Aggregate {
                pipeline: vec![
                    json!({ "$group": { "_id": "$doctor.department.department_name", "count": { "$sum": 1 } } }),
                    json!({ "$sort": { "count": -1 } }),
                ],
            },
        ),
    ]
}
