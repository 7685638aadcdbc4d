//! Typed hospital records
//!
//! Every appointment is a self-contained document: the patient, the doctor
//! with their department, and the bill with its medicines are embedded copies,
//! not references.
//!
//! ```text
//! Appointment
//! ├── patient: Patient
//! │   └── insurances: [Insurance]?
//! ├── doctor: Doctor
//! │   └── department: Department
//! └── billing: Billing?
//!     └── medicines: [Medicine]?
//! ```

pub mod appointment;
pub mod billing;
pub mod dates;
pub mod doctor;
pub mod patient;
pub mod schema;

pub use appointment::{Appointment, AppointmentStatus};
pub use billing::{Billing, Medicine, PaymentStatus};
pub use doctor::{Department, Doctor, Weekday};
pub use patient::{Insurance, Patient};

/// Name of the soft-delete marker carried by every entity
pub const DELETED_FLAG: &str = "is_deleted";
