use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params};

use crate::db::{format_timestamp, parse_timestamp, storage_precision, DatabaseError};
use crate::models::*;

const PRESCRIPTION_COLUMNS: &str =
    "p.id, p.patient_id, p.doctor_id, p.medication, p.instructions, p.issued_at,
     EXISTS (SELECT 1 FROM dispenses d WHERE d.prescription_id = p.id)";

pub fn insert_prescription(
    conn: &Connection,
    patient_id: i64,
    doctor_id: i64,
    medication: &str,
    instructions: &str,
    issued_at: DateTime<Utc>,
) -> Result<Prescription, DatabaseError> {
    conn.execute(
        "INSERT INTO prescriptions (patient_id, doctor_id, medication, instructions, issued_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            patient_id,
            doctor_id,
            medication,
            instructions,
            format_timestamp(&issued_at),
        ],
    )?;
    Ok(Prescription {
        id: conn.last_insert_rowid(),
        patient_id,
        doctor_id,
        medication: medication.to_string(),
        instructions: instructions.to_string(),
        issued_at: storage_precision(issued_at),
        dispensed: false,
    })
}

pub fn get_prescription(conn: &Connection, id: i64) -> Result<Option<Prescription>, DatabaseError> {
    let sql = format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions p WHERE p.id = ?1");
    let row = conn
        .query_row(&sql, params![id], prescription_row_from_rusqlite)
        .optional()?;
    row.map(prescription_from_row).transpose()
}

/// Prescriptions without a dispense, oldest first.
pub fn list_undispensed_prescriptions(conn: &Connection) -> Result<Vec<Prescription>, DatabaseError> {
    query_prescriptions(
        conn,
        &format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions p
             WHERE NOT EXISTS (SELECT 1 FROM dispenses d WHERE d.prescription_id = p.id)
             ORDER BY p.issued_at, p.id"
        ),
        [],
    )
}

pub fn list_prescriptions_by_doctor(
    conn: &Connection,
    doctor_id: i64,
) -> Result<Vec<Prescription>, DatabaseError> {
    query_prescriptions(
        conn,
        &format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions p
             WHERE p.doctor_id = ?1 ORDER BY p.issued_at, p.id"
        ),
        params![doctor_id],
    )
}

pub fn list_prescriptions_by_patient(
    conn: &Connection,
    patient_id: i64,
) -> Result<Vec<Prescription>, DatabaseError> {
    query_prescriptions(
        conn,
        &format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions p
             WHERE p.patient_id = ?1 ORDER BY p.issued_at, p.id"
        ),
        params![patient_id],
    )
}

/// Index lookup on the unique prescription link; no scan of dispenses.
pub fn prescription_has_dispense(conn: &Connection, prescription_id: i64) -> Result<bool, DatabaseError> {
    let exists = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM dispenses WHERE prescription_id = ?1)",
        params![prescription_id],
        |row| row.get::<_, bool>(0),
    )?;
    Ok(exists)
}

fn query_prescriptions<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, prescription_row_from_rusqlite)?;

    let mut prescriptions = Vec::new();
    for row in rows {
        prescriptions.push(prescription_from_row(row?)?);
    }
    Ok(prescriptions)
}

// Internal row type for Prescription mapping
struct PrescriptionRow {
    id: i64,
    patient_id: i64,
    doctor_id: i64,
    medication: String,
    instructions: String,
    issued_at: String,
    dispensed: bool,
}

fn prescription_row_from_rusqlite(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrescriptionRow> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        medication: row.get(3)?,
        instructions: row.get(4)?,
        issued_at: row.get(5)?,
        dispensed: row.get(6)?,
    })
}

fn prescription_from_row(row: PrescriptionRow) -> Result<Prescription, DatabaseError> {
    Ok(Prescription {
        id: row.id,
        patient_id: row.patient_id,
        doctor_id: row.doctor_id,
        medication: row.medication,
        instructions: row.instructions,
        issued_at: parse_timestamp("issued_at", &row.issued_at)?,
        dispensed: row.dispensed,
    })
}
