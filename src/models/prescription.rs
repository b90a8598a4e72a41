use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An issued prescription. `dispensed` is derived from the presence of a
/// dispense row when the record is read, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub medication: String,
    pub instructions: String,
    pub issued_at: DateTime<Utc>,
    pub dispensed: bool,
}

/// Arguments for issuing a prescription.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPrescription {
    pub patient_id: i64,
    pub doctor_id: i64,
    pub medication: String,
    pub instructions: String,
}
