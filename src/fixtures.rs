//! Seed appointments
//!
//! The built-in fixture holds six appointments covering every shape the
//! catalog cares about: no bill (a001, a003, a004), one medicine (a005,
//! a008), two medicines (a002), and a patient with insurance (a004).
//!
//! Seed files are JSON arrays of appointments using the model's field names;
//! dates may be `YYYY-MM-DD` strings or extended-JSON `$date` values.

use std::path::Path;

use tracing::info;

use crate::error::{HmsError, Result};
use crate::model::Appointment;

/// Built-in seed appointments as JSON
pub const SEED_APPOINTMENTS: &str = include_str!("../data/appointments.json");

/// The built-in seed appointments
pub fn seed_appointments() -> Result<Vec<Appointment>> {
    Ok(serde_json::from_str(SEED_APPOINTMENTS)?)
}

/// Load appointments from a JSON seed file
pub fn load_seed_file(path: &Path) -> Result<Vec<Appointment>> {
    let contents = std::fs::read_to_string(path)?;
    let appointments: Vec<Appointment> = serde_json::from_str(&contents).map_err(|e| {
        HmsError::Config(format!("Failed to parse seed file {:?}: {}", path, e))
    })?;

    info!("Loaded {} appointments from {:?}", appointments.len(), path);
    Ok(appointments)
}

/// Write appointments to a JSON seed file
pub fn save_seed_file(path: &Path, appointments: &[Appointment]) -> Result<()> {
    let contents = serde_json::to_string_pretty(appointments)?;
    std::fs::write(path, contents)?;
    Ok(())
}
