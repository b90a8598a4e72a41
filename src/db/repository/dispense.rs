use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{format_timestamp, parse_amount, parse_timestamp, storage_precision, DatabaseError};
use crate::models::*;

/// Insert a dispense row. A second row for the same prescription fails on
/// the unique index (see [`DatabaseError::is_unique_violation`]).
pub fn insert_dispense(
    conn: &Connection,
    prescription_id: i64,
    pharmacy_id: i64,
    pharmacist_name: &str,
    amount: Decimal,
    notes: &str,
    dispensed_at: DateTime<Utc>,
) -> Result<Dispense, DatabaseError> {
    conn.execute(
        "INSERT INTO dispenses (prescription_id, pharmacy_id, pharmacist_name, amount, notes, dispensed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            prescription_id,
            pharmacy_id,
            pharmacist_name,
            amount.to_string(),
            notes,
            format_timestamp(&dispensed_at),
        ],
    )?;
    Ok(Dispense {
        id: conn.last_insert_rowid(),
        prescription_id,
        pharmacy_id,
        pharmacist_name: pharmacist_name.to_string(),
        amount,
        notes: notes.to_string(),
        dispensed_at: storage_precision(dispensed_at),
    })
}

pub fn get_dispense_by_prescription(
    conn: &Connection,
    prescription_id: i64,
) -> Result<Option<Dispense>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, prescription_id, pharmacy_id, pharmacist_name, amount, notes, dispensed_at
             FROM dispenses WHERE prescription_id = ?1",
            params![prescription_id],
            dispense_row_from_rusqlite,
        )
        .optional()?;
    row.map(dispense_from_row).transpose()
}

/// All dispenses for a pharmacy, oldest first.
pub fn list_dispenses_by_pharmacy(
    conn: &Connection,
    pharmacy_id: i64,
) -> Result<Vec<Dispense>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, prescription_id, pharmacy_id, pharmacist_name, amount, notes, dispensed_at
         FROM dispenses WHERE pharmacy_id = ?1 ORDER BY dispensed_at, id",
    )?;
    let rows = stmt.query_map(params![pharmacy_id], dispense_row_from_rusqlite)?;

    let mut dispenses = Vec::new();
    for row in rows {
        dispenses.push(dispense_from_row(row?)?);
    }
    Ok(dispenses)
}

struct DispenseRow {
    id: i64,
    prescription_id: i64,
    pharmacy_id: i64,
    pharmacist_name: String,
    amount: String,
    notes: String,
    dispensed_at: String,
}

fn dispense_row_from_rusqlite(row: &rusqlite::Row<'_>) -> rusqlite::Result<DispenseRow> {
    Ok(DispenseRow {
        id: row.get(0)?,
        prescription_id: row.get(1)?,
        pharmacy_id: row.get(2)?,
        pharmacist_name: row.get(3)?,
        amount: row.get(4)?,
        notes: row.get(5)?,
        dispensed_at: row.get(6)?,
    })
}

fn dispense_from_row(row: DispenseRow) -> Result<Dispense, DatabaseError> {
    Ok(Dispense {
        id: row.id,
        prescription_id: row.prescription_id,
        pharmacy_id: row.pharmacy_id,
        pharmacist_name: row.pharmacist_name,
        amount: parse_amount(&row.amount)?,
        notes: row.notes,
        dispensed_at: parse_timestamp("dispensed_at", &row.dispensed_at)?,
    })
}
