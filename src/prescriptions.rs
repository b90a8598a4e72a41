//! Prescription lifecycle: issue, then dispense at most once.
//!
//! A prescription moves Issued → Dispensed exactly once. The dispense
//! check-then-insert runs inside an IMMEDIATE transaction, so only one
//! writer can be between the check and the insert at any time, and the
//! unique index on `dispenses.prescription_id` rejects anything that
//! slips past. Either way the caller sees `AlreadyDispensed`.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;

use crate::db::{self, DatabaseError};
use crate::directory::Directory;
use crate::models::enums::DirectoryKind;
use crate::models::{Dispense, DispenseRequest, NewPrescription, Prescription};

// ═══════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum PrescriptionError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Prescription {prescription_id} has already been dispensed")]
    AlreadyDispensed { prescription_id: i64 },
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

impl PrescriptionError {
    fn not_found(kind: DirectoryKind, id: i64) -> Self {
        Self::NotFound {
            entity: kind.as_str(),
            id,
        }
    }
}

// ═══════════════════════════════════════════
// Issue
// ═══════════════════════════════════════════

/// Issue a new prescription stamped with the current time.
pub fn issue_prescription(
    conn: &Connection,
    directory: &dyn Directory,
    input: &NewPrescription,
) -> Result<Prescription, PrescriptionError> {
    issue_prescription_at(conn, directory, input, Utc::now())
}

/// Issue a prescription with an explicit issue time.
pub fn issue_prescription_at(
    conn: &Connection,
    directory: &dyn Directory,
    input: &NewPrescription,
    issued_at: DateTime<Utc>,
) -> Result<Prescription, PrescriptionError> {
    let medication = input.medication.trim();
    if medication.is_empty() {
        return Err(PrescriptionError::Validation(
            "medication must not be empty".into(),
        ));
    }
    if !directory.patient_exists(input.patient_id)? {
        return Err(PrescriptionError::not_found(DirectoryKind::Patient, input.patient_id));
    }
    if !directory.doctor_exists(input.doctor_id)? {
        return Err(PrescriptionError::not_found(DirectoryKind::Doctor, input.doctor_id));
    }

    let prescription = db::insert_prescription(
        conn,
        input.patient_id,
        input.doctor_id,
        medication,
        input.instructions.trim(),
        issued_at,
    )?;

    tracing::info!(
        prescription_id = prescription.id,
        patient_id = prescription.patient_id,
        doctor_id = prescription.doctor_id,
        "Prescription issued"
    );
    Ok(prescription)
}

// ═══════════════════════════════════════════
// Dispense
// ═══════════════════════════════════════════

/// Dispense a prescription, stamped with the current time.
pub fn dispense_prescription(
    conn: &mut Connection,
    directory: &dyn Directory,
    request: &DispenseRequest,
) -> Result<Dispense, PrescriptionError> {
    dispense_prescription_at(conn, directory, request, Utc::now())
}

/// Dispense a prescription with an explicit dispense time.
///
/// Checks run in this order: prescription exists, not yet dispensed,
/// input valid, pharmacy exists. A repeat call for a dispensed
/// prescription therefore fails with `AlreadyDispensed` whatever its
/// other arguments are.
pub fn dispense_prescription_at(
    conn: &mut Connection,
    directory: &dyn Directory,
    request: &DispenseRequest,
    dispensed_at: DateTime<Utc>,
) -> Result<Dispense, PrescriptionError> {
    let prescription_id = request.prescription_id;

    // Checks that need no write lock run first, so the directory is never
    // consulted while this connection holds SQLite's write lock.
    if db::get_prescription(conn, prescription_id)?.is_none() {
        return Err(PrescriptionError::NotFound {
            entity: "prescription",
            id: prescription_id,
        });
    }
    if db::prescription_has_dispense(conn, prescription_id)? {
        tracing::warn!(prescription_id, "Dispense rejected: already dispensed");
        return Err(PrescriptionError::AlreadyDispensed { prescription_id });
    }

    if request.amount < Decimal::ZERO {
        return Err(PrescriptionError::Validation(format!(
            "amount must not be negative (got {})",
            request.amount
        )));
    }
    let pharmacist_name = request.pharmacist_name.trim();
    if pharmacist_name.is_empty() {
        return Err(PrescriptionError::Validation(
            "pharmacist name must not be empty".into(),
        ));
    }
    if !directory.pharmacy_exists(request.pharmacy_id)? {
        return Err(PrescriptionError::not_found(DirectoryKind::Pharmacy, request.pharmacy_id));
    }

    // Another caller may have dispensed since the first look.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(DatabaseError::from)?;
    if db::prescription_has_dispense(&tx, prescription_id)? {
        tracing::warn!(prescription_id, "Dispense rejected: dispensed concurrently");
        return Err(PrescriptionError::AlreadyDispensed { prescription_id });
    }

    let dispense = match db::insert_dispense(
        &tx,
        prescription_id,
        request.pharmacy_id,
        pharmacist_name,
        request.amount,
        request.notes.trim(),
        dispensed_at,
    ) {
        Ok(dispense) => dispense,
        Err(e) if e.is_unique_violation() => {
            tracing::warn!(prescription_id, "Dispense rejected by unique index");
            return Err(PrescriptionError::AlreadyDispensed { prescription_id });
        }
        Err(e) => return Err(e.into()),
    };
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        prescription_id,
        dispense_id = dispense.id,
        pharmacy_id = dispense.pharmacy_id,
        amount = %dispense.amount,
        "Prescription dispensed"
    );
    Ok(dispense)
}

// ═══════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════

/// Prescriptions with no dispense yet, oldest first. Recomputed per call.
pub fn list_available_prescriptions(conn: &Connection) -> Result<Vec<Prescription>, PrescriptionError> {
    Ok(db::list_undispensed_prescriptions(conn)?)
}

/// A pharmacy's dispenses in dispense order. Unknown pharmacies have none.
pub fn get_dispense_history(
    conn: &Connection,
    pharmacy_id: i64,
) -> Result<Vec<Dispense>, PrescriptionError> {
    Ok(db::list_dispenses_by_pharmacy(conn, pharmacy_id)?)
}

pub fn get_doctor_prescriptions(
    conn: &Connection,
    doctor_id: i64,
) -> Result<Vec<Prescription>, PrescriptionError> {
    Ok(db::list_prescriptions_by_doctor(conn, doctor_id)?)
}

pub fn get_patient_prescriptions(
    conn: &Connection,
    patient_id: i64,
) -> Result<Vec<Prescription>, PrescriptionError> {
    Ok(db::list_prescriptions_by_patient(conn, patient_id)?)
}

pub fn get_prescription(conn: &Connection, id: i64) -> Result<Prescription, PrescriptionError> {
    db::get_prescription(conn, id)?.ok_or(PrescriptionError::NotFound {
        entity: "prescription",
        id,
    })
}

pub fn get_dispense_for_prescription(
    conn: &Connection,
    prescription_id: i64,
) -> Result<Option<Dispense>, PrescriptionError> {
    Ok(db::get_dispense_by_prescription(conn, prescription_id)?)
}

/// Total billed by a pharmacy across all its dispenses.
pub fn pharmacy_billing_total(conn: &Connection, pharmacy_id: i64) -> Result<Decimal, PrescriptionError> {
    let total = db::list_dispenses_by_pharmacy(conn, pharmacy_id)?
        .iter()
        .map(|d| d.amount)
        .sum();
    Ok(total)
}
