//! Catalog filter queries against the seed appointments
#![allow(clippy::unwrap_used)]

mod common;

use common::*;
use serde_json::{json, Value};

use hms::fixtures::seed_appointments;
use hms::model::Appointment;

#[test]
fn test_first_name_prefix_is_case_insensitive() {
    let records = seeded();
    let docs = run(&records, "find-01");

    assert_eq!(docs.len(), 1);
    let doc = &docs[0];
    assert!(doc.get("_id").is_some());
    assert_eq!(
        doc["patient"],
        json!({ "first_name": "Robert", "last_name": "Brown", "gender": "Male" })
    );
    assert!(doc.get("appointment_id").is_none());
}

#[test]
fn test_elem_match_projects_matching_medicine() {
    let records = seeded();
    let docs = run(&records, "find-02");

    assert_eq!(appointment_ids(&docs), vec!["a002", "a005", "a008"]);
    let names: Vec<&str> = docs
        .iter()
        .map(|d| {
            let meds = d["billing"]["medicines"].as_array().unwrap();
            assert_eq!(meds.len(), 1);
            meds[0]["medicine_name"].as_str().unwrap()
        })
        .collect();
    assert_eq!(names, vec!["Paracetamol", "Aspirin", "Metformin"]);
}

#[test]
fn test_completed_female_patients() {
    let records = seeded();
    let docs = run(&records, "find-03");

    assert_eq!(appointment_ids(&docs), vec!["a002"]);
    assert_eq!(docs[0]["status"], json!("Completed"));
    assert_eq!(docs[0]["patient"], json!({ "first_name": "Alice", "last_name": "Smith" }));
}

#[test]
fn test_positional_projection_returns_one_medicine() {
    let records = seeded();
    let docs = run(&records, "find-04");

    assert_eq!(appointment_ids(&docs), vec!["a002"]);
    let meds = docs[0]["billing"]["medicines"].as_array().unwrap();
    assert_eq!(meds.len(), 1);
    assert_eq!(meds[0]["medicine_name"], json!("Ibuprofen"));
    assert_eq!(meds[0]["medicine_id"], json!("m002"));
}

#[test]
fn test_nor_excludes_completed_and_cancelled() {
    let records = seeded();
    let docs = run(&records, "find-05");

    assert_eq!(appointment_ids(&docs), vec!["a001", "a003"]);
    let statuses: Vec<&Value> = docs.iter().map(|d| &d["status"]).collect();
    assert_eq!(statuses, vec![&json!("Scheduled"), &json!("Walk-In")]);
}

#[test]
fn test_department_projection_keeps_embedded_document() {
    let records = seeded();
    let docs = run(&records, "find-06");

    assert_eq!(appointment_ids(&docs), vec!["a001", "a004"]);
    assert_eq!(
        docs[0]["doctor"],
        json!({
            "first_name": "Rajesh",
            "last_name": "Gupta",
            "department": {
                "department_id": "dep002",
                "department_name": "Neurology",
                "is_deleted": false
            }
        })
    );
}

#[test]
fn test_no_medicines_predicate_matches_null_billing() {
    let records = seeded();
    for id in ["find-07", "find-15"] {
        let docs = run(&records, id);
        assert_eq!(appointment_ids(&docs), vec!["a001", "a003", "a004"]);
        for doc in &docs {
            assert_eq!(doc["billing"], Value::Null);
            assert!(doc["doctor"].get("doctor_id").is_some());
        }
    }
}

#[test]
fn test_no_medicines_predicate_matches_empty_medicines() {
    let mut appointments = seed_appointments().unwrap();
    // a008 keeps its bill but dispenses nothing
    appointments[5].billing.as_mut().unwrap().medicines.clear();
    let records = seeded_with(&test_config(), &appointments);

    let docs = run(&records, "find-07");
    assert_eq!(appointment_ids(&docs), vec!["a001", "a003", "a004", "a008"]);
    assert_eq!(docs[3]["billing"]["medicines"], json!([]));

    let expected: Vec<&str> = appointments
        .iter()
        .filter(|a| !a.has_medicines())
        .map(|a| a.appointment_id.as_str())
        .collect();
    assert_eq!(appointment_ids(&docs), expected);
}

#[test]
fn test_absent_medicines_in_seed_file_read_as_empty() {
    let mut raw: Value = serde_json::from_str(hms::fixtures::SEED_APPOINTMENTS).unwrap();
    raw[4]["billing"].as_object_mut().unwrap().remove("medicines");
    let appointments: Vec<Appointment> = serde_json::from_value(raw).unwrap();

    let records = seeded_with(&test_config(), &appointments);
    let docs = run(&records, "find-15");
    assert_eq!(appointment_ids(&docs), vec!["a001", "a003", "a004", "a005"]);
}

#[test]
fn test_nor_on_first_names() {
    let records = seeded();
    let docs = run(&records, "find-08");

    let names: Vec<&str> = docs
        .iter()
        .map(|d| d["patient"]["first_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Robert", "Emily", "David", "Bob"]);
    assert!(docs.iter().all(|d| d.get("appointment_id").is_none()));
}

#[test]
fn test_future_appointments() {
    let records = seeded();
    let docs = run(&records, "find-09");

    assert_eq!(appointment_ids(&docs), vec!["a001"]);
    assert_eq!(docs[0]["appointment_date"], json!({ "$date": 1764633600000i64 }));
    assert_eq!(docs[0]["appointment_time"], json!("10:00:00"));
}

#[test]
fn test_both_contact_numbers_present() {
    let records = seeded();
    let docs = run(&records, "find-10");

    assert_eq!(docs.len(), 6);
    let keys: Vec<&String> = docs[0]["patient"].as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["patient_id", "contact_number", "emergency_contact_number"]);
}

#[test]
fn test_bill_over_100() {
    let records = seeded();
    let docs = run(&records, "find-11");

    assert_eq!(appointment_ids(&docs), vec!["a002", "a005"]);
    assert_amount(&docs[0]["billing"]["total_amount"], 257.99);
    assert_amount(&docs[1]["billing"]["total_amount"], 150.74);
}

#[test]
fn test_array_membership_on_available_days() {
    let records = seeded();
    let docs = run(&records, "find-12");

    assert_eq!(appointment_ids(&docs), vec!["a002", "a003", "a005", "a008"]);
    for doc in &docs {
        let days = doc["doctor"]["available_days"].as_array().unwrap();
        assert!(days.contains(&json!("Friday")));
    }
}

#[test]
fn test_age_over_40_at_appointment() {
    let records = seeded();
    let docs = run(&records, "find-13");

    assert_eq!(appointment_ids(&docs), vec!["a005"]);
    assert_eq!(docs[0]["patient"]["first_name"], json!("David"));

    // Same answer as the typed model
    let expected: Vec<String> = records
        .appointments()
        .unwrap()
        .iter()
        .filter(|a| a.patient_age() > 40.0)
        .map(|a| a.appointment_id.clone())
        .collect();
    assert_eq!(expected, vec!["a005".to_string()]);
}

#[test]
fn test_age_boundary() {
    let mut appointment = seed_appointments()
        .unwrap()
        .into_iter()
        .find(|a| a.appointment_id == "a003")
        .unwrap();
    appointment.appointment_date = "2025-03-21".parse().unwrap();

    // ≈39.49 years: no match
    appointment.patient.date_of_birth = "1985-09-23".parse().unwrap();
    let young = appointment.clone();
    // ≈46.76 years: match
    appointment.patient.date_of_birth = "1978-06-17".parse().unwrap();
    appointment.appointment_id = "a009".to_string();
    let old = appointment;

    let records = seeded_with(&test_config(), &[young.clone(), old]);
    let docs = run(&records, "find-13");
    assert_eq!(appointment_ids(&docs), vec!["a009"]);
    assert!((young.patient_age() - 39.49).abs() < 0.01);
}

#[test]
fn test_address_substring() {
    let records = seeded();
    let docs = run(&records, "find-14");

    assert_eq!(docs.len(), 1);
    assert_eq!(
        docs[0]["patient"]["address"],
        json!("202 Cedar Drive, Seattle, WA 98101, USA")
    );
}

#[test]
fn test_queries_are_idempotent() {
    let records = seeded();
    for entry in records.catalog().entries() {
        let first = run(&records, &entry.id);
        let second = run(&records, &entry.id);
        assert_eq!(first, second, "{} changed between runs", entry.id);
    }
}

#[test]
fn test_exclude_deleted_is_opt_in() {
    let mut appointments = seed_appointments().unwrap();
    appointments[1].is_deleted = true;

    let records = seeded_with(&test_config(), &appointments);
    assert_eq!(appointment_ids(&run(&records, "find-11")), vec!["a002", "a005"]);

    let mut config = test_config();
    config.evaluation.exclude_deleted = true;
    let records = seeded_with(&config, &appointments);
    assert_eq!(appointment_ids(&run(&records, "find-11")), vec!["a005"]);
}

#[test]
fn test_exclude_deleted_prunes_medicines_before_matching() {
    let mut appointments = seed_appointments().unwrap();
    // Ibuprofen on a002 and Aspirin, the only medicine on a005
    appointments[1].billing.as_mut().unwrap().medicines[0].is_deleted = true;
    appointments[4].billing.as_mut().unwrap().medicines[0].is_deleted = true;

    let mut config = test_config();
    config.evaluation.exclude_deleted = true;
    let records = seeded_with(&config, &appointments);

    assert!(run(&records, "find-04").is_empty());

    let expected = vec!["a001", "a003", "a004", "a005"];
    for id in ["find-07", "find-15", "agg-07"] {
        let docs = run(&records, id);
        assert_eq!(appointment_ids(&docs), expected, "{}", id);
    }
}

#[test]
fn test_results_decode_into_model() {
    let records = seeded();
    let docs: Vec<Value> = records.find(&json!({ "status": "Completed" }), &Value::Null).unwrap().collect();
    let appointments: Vec<Appointment> = docs
        .into_iter()
        .map(|d| Appointment::from_document(d).unwrap())
        .collect();
    let ids: Vec<&str> = appointments.iter().map(|a| a.appointment_id.as_str()).collect();
    assert_eq!(ids, vec!["a002", "a005", "a008"]);
}

#[test]
fn test_unknown_entry_is_an_error() {
    let records = seeded();
    assert!(matches!(
        records.run("find-16"),
        Err(hms::HmsError::UnknownCatalogEntry(_))
    ));
}
