//! Catalog pipelines against the seed appointments
#![allow(clippy::unwrap_used)]

mod common;

use common::*;
use serde_json::{json, Value};

use hms::fixtures::seed_appointments;

fn count(value: &Value) -> f64 {
    value.as_f64().unwrap()
}

fn medicine_names(doc: &Value, field: &str) -> Vec<String> {
    doc[field]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| match m {
            Value::String(s) => s.clone(),
            other => other["medicine_name"].as_str().unwrap().to_string(),
        })
        .collect()
}

#[test]
fn test_appointments_per_doctor_in_first_seen_order() {
    let records = seeded();
    let docs = run(&records, "agg-01");

    assert_eq!(group_keys(&docs), vec!["doc002", "doc003", "doc001", "doc004"]);
    let counts: Vec<f64> = docs.iter().map(|d| count(&d["totalAppointments"])).collect();
    assert_eq!(counts, vec![2.0, 2.0, 1.0, 1.0]);
    assert_eq!(docs[0]["doctor_name"], json!("Rajesh"));
    assert_eq!(docs[1]["doctor_name"], json!("Samuel"));
}

#[test]
fn test_medicines_per_patient() {
    let records = seeded();
    let docs = run(&records, "agg-02");

    assert_eq!(group_keys(&docs), vec!["p002", "p005", "p008"]);
    assert_eq!(medicine_names(&docs[0], "prescribed_medicines"), vec!["Ibuprofen", "Paracetamol"]);
    assert_eq!(medicine_names(&docs[1], "prescribed_medicines"), vec!["Aspirin"]);
    assert_eq!(docs[2]["patient_name"], json!("Bob"));
}

#[test]
fn test_paid_bills() {
    let records = seeded();
    let docs = run(&records, "agg-03");

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["patient_full_name"], json!("Alice Smith"));
    assert_eq!(count(&docs[0]["med_count"]), 2.0);
    assert_amount(&docs[0]["total_bill_amount"], 257.99);
}

#[test]
fn test_top_medicines_by_quantity() {
    let records = seeded();
    let docs = run(&records, "agg-04");

    // Paracetamol and Metformin tie at 2; first seen stays first
    assert_eq!(group_keys(&docs), vec!["Aspirin", "Paracetamol", "Metformin"]);
    let counts: Vec<f64> = docs.iter().map(|d| count(&d["prescriptionCount"])).collect();
    assert_eq!(counts, vec![3.0, 2.0, 2.0]);
}

#[test]
fn test_expiring_medicines_within_window() {
    let records = seeded();
    let docs = run(&records, "agg-05");

    assert_eq!(docs.len(), 6);
    for doc in &docs {
        let expiring = medicine_names(doc, "expiring_medicines");
        match doc["appointment_id"].as_str().unwrap() {
            "a005" => assert_eq!(expiring, vec!["Aspirin"]),
            _ => assert!(expiring.is_empty(), "{}", doc),
        }
    }
}

#[test]
fn test_expiry_window_is_configurable() {
    let appointments = seed_appointments().unwrap();

    // 2025-05-09 + 150 days reaches Ibuprofen (2025-09-30)
    let mut config = test_config();
    config.evaluation.expiry_window_days = 150;
    let docs = run(&seeded_with(&config, &appointments), "agg-05");
    assert_eq!(medicine_names(&docs[1], "expiring_medicines"), vec!["Ibuprofen"]);
    assert_eq!(medicine_names(&docs[4], "expiring_medicines"), vec!["Aspirin"]);

    // 30 days stops short of Aspirin (2025-06-15)
    config.evaluation.expiry_window_days = 30;
    let docs = run(&seeded_with(&config, &appointments), "agg-05");
    assert!(docs.iter().all(|d| medicine_names(d, "expiring_medicines").is_empty()));
}

#[test]
fn test_expiry_follows_reference_time() {
    let mut config = test_config();
    config.evaluation.reference_time = Some("2025-06-15".to_string());
    let docs = run(&seeded_with(&config, &seed_appointments().unwrap()), "agg-05");

    // Expiry on the reference day itself is not in the future
    assert!(medicine_names(&docs[4], "expiring_medicines").is_empty());
}

#[test]
fn test_average_medicines_per_appointment() {
    let records = seeded();
    let docs = run(&records, "agg-06");

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["_id"], Value::Null);
    let avg = count(&docs[0]["avgMedsPerAppointment"]);
    assert!((avg - 4.0 / 6.0).abs() < 1e-9);
}

#[test]
fn test_appointments_without_medicines() {
    let records = seeded();
    let docs = run(&records, "agg-07");

    assert_eq!(appointment_ids(&docs), vec!["a001", "a003", "a004"]);
    for doc in &docs {
        assert_eq!(doc["billing"], Value::Null);
        let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["_id", "appointment_id", "status", "billing"]);
    }

    // Agrees with the find entries
    let found = run(&records, "find-07");
    assert_eq!(appointment_ids(&found), appointment_ids(&docs));
}

#[test]
fn test_departments_sorted_by_name() {
    let records = seeded();
    let docs = run(&records, "agg-08");

    assert_eq!(
        group_keys(&docs),
        vec!["Cardiology", "Neurology", "Orthopedics", "Pediatrics"]
    );
    assert!(docs.iter().all(|d| d.as_object().unwrap().len() == 1));
}

#[test]
fn test_monthly_trend_excludes_out_of_range_dates() {
    let records = seeded();
    let docs = run(&records, "agg-09");

    // a001 (2025-12-02) falls after the window
    assert_eq!(group_keys(&docs), vec!["2025-01", "2025-02", "2025-03"]);
    let counts: Vec<f64> = docs.iter().map(|d| count(&d["count"])).collect();
    assert_eq!(counts, vec![2.0, 2.0, 1.0]);
}

#[test]
fn test_revenue_by_department() {
    let records = seeded();
    let docs = run(&records, "agg-10");

    assert_eq!(group_keys(&docs), vec!["Pediatrics", "Orthopedics"]);
    assert_amount(&docs[0]["revenue"], 408.73);
    assert_amount(&docs[1]["revenue"], 25.0);
}

#[test]
fn test_top_patients_by_visits() {
    let records = seeded();
    let docs = run(&records, "agg-11");

    assert_eq!(group_keys(&docs), vec!["p001", "p002", "p003", "p004", "p005"]);
    assert_eq!(docs[0]["patient_name"], json!("John Doe"));
    assert!(docs.iter().all(|d| count(&d["visits"]) == 1.0));
}

#[test]
fn test_top_patients_counts_repeat_visits() {
    let mut appointments = seed_appointments().unwrap();
    let mut repeat = appointments[5].clone();
    repeat.appointment_id = "a009".to_string();
    appointments.push(repeat);

    let docs = run(&seeded_with(&test_config(), &appointments), "agg-11");
    assert_eq!(group_keys(&docs), vec!["p008", "p001", "p002", "p003", "p004"]);
    assert_eq!(count(&docs[0]["visits"]), 2.0);
}

#[test]
fn test_average_bill_per_doctor() {
    let records = seeded();
    let docs = run(&records, "agg-12");

    assert_eq!(group_keys(&docs), vec!["doc003", "doc004"]);
    assert_eq!(docs[0]["doctor_name"], json!("Samuel"));
    assert_amount(&docs[0]["avgBilling"], 204.365);
    assert_amount(&docs[1]["avgBilling"], 25.0);
}

#[test]
fn test_appointments_per_department() {
    let records = seeded();
    let docs = run(&records, "agg-13");

    assert_eq!(
        group_keys(&docs),
        vec!["Neurology", "Pediatrics", "Cardiology", "Orthopedics"]
    );
    let counts: Vec<f64> = docs.iter().map(|d| count(&d["count"])).collect();
    assert_eq!(counts, vec![2.0, 2.0, 1.0, 1.0]);
}

#[test]
fn test_exclude_deleted_prunes_flagged_medicines() {
    let mut appointments = seed_appointments().unwrap();
    // Paracetamol on a002
    appointments[1].billing.as_mut().unwrap().medicines[1].is_deleted = true;

    let docs = run(&seeded_with(&test_config(), &appointments), "agg-04");
    assert_eq!(group_keys(&docs), vec!["Aspirin", "Paracetamol", "Metformin"]);

    let mut config = test_config();
    config.evaluation.exclude_deleted = true;
    let records = seeded_with(&config, &appointments);

    let docs = run(&records, "agg-04");
    assert_eq!(group_keys(&docs), vec!["Aspirin", "Metformin", "Ibuprofen"]);

    let docs = run(&records, "agg-02");
    assert_eq!(medicine_names(&docs[0], "prescribed_medicines"), vec!["Ibuprofen"]);
}

#[test]
fn test_exclude_deleted_drops_flagged_appointments() {
    let mut appointments = seed_appointments().unwrap();
    appointments[0].is_deleted = true;

    let mut config = test_config();
    config.evaluation.exclude_deleted = true;
    let records = seeded_with(&config, &appointments);

    let docs = run(&records, "agg-01");
    assert_eq!(group_keys(&docs), vec!["doc003", "doc001", "doc002", "doc004"]);
    assert_eq!(count(&docs[2]["totalAppointments"]), 1.0);
}

#[test]
fn test_pipelines_leave_the_collection_unchanged() {
    let records = seeded();
    let before = records.appointments().unwrap();
    for entry in records.catalog().entries() {
        run(&records, &entry.id);
    }
    assert_eq!(records.appointments().unwrap(), before);
}
