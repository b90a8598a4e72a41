use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{format_timestamp, parse_timestamp, storage_precision, DatabaseError};
use crate::models::enums::DirectoryKind;
use crate::models::*;

pub fn insert_doctor(
    conn: &Connection,
    name: &str,
    specialty: Option<&str>,
    created_at: DateTime<Utc>,
) -> Result<Doctor, DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (name, specialty, created_at) VALUES (?1, ?2, ?3)",
        params![name, specialty, format_timestamp(&created_at)],
    )?;
    Ok(Doctor {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        specialty: specialty.map(|s| s.to_string()),
        created_at: storage_precision(created_at),
    })
}

pub fn insert_patient(
    conn: &Connection,
    name: &str,
    phone: Option<&str>,
    created_at: DateTime<Utc>,
) -> Result<Patient, DatabaseError> {
    conn.execute(
        "INSERT INTO patients (name, phone, created_at) VALUES (?1, ?2, ?3)",
        params![name, phone, format_timestamp(&created_at)],
    )?;
    Ok(Patient {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        phone: phone.map(|s| s.to_string()),
        created_at: storage_precision(created_at),
    })
}

pub fn insert_pharmacy(
    conn: &Connection,
    name: &str,
    address: Option<&str>,
    created_at: DateTime<Utc>,
) -> Result<Pharmacy, DatabaseError> {
    conn.execute(
        "INSERT INTO pharmacies (name, address, created_at) VALUES (?1, ?2, ?3)",
        params![name, address, format_timestamp(&created_at)],
    )?;
    Ok(Pharmacy {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        address: address.map(|s| s.to_string()),
        created_at: storage_precision(created_at),
    })
}

/// Shared shape of the three directory tables: id, name, one optional
/// attribute, created_at.
type DirectoryRow = (i64, String, Option<String>, String);

fn list_directory_rows(
    conn: &Connection,
    kind: DirectoryKind,
) -> Result<Vec<DirectoryRow>, DatabaseError> {
    let column = match kind {
        DirectoryKind::Doctor => "specialty",
        DirectoryKind::Patient => "phone",
        DirectoryKind::Pharmacy => "address",
    };
    let sql = format!(
        "SELECT id, name, {column}, created_at FROM {} ORDER BY id",
        kind.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn list_doctors(conn: &Connection) -> Result<Vec<Doctor>, DatabaseError> {
    list_directory_rows(conn, DirectoryKind::Doctor)?
        .into_iter()
        .map(|(id, name, specialty, created_at)| {
            Ok(Doctor {
                id,
                name,
                specialty,
                created_at: parse_timestamp("created_at", &created_at)?,
            })
        })
        .collect()
}

pub fn list_patients(conn: &Connection) -> Result<Vec<Patient>, DatabaseError> {
    list_directory_rows(conn, DirectoryKind::Patient)?
        .into_iter()
        .map(|(id, name, phone, created_at)| {
            Ok(Patient {
                id,
                name,
                phone,
                created_at: parse_timestamp("created_at", &created_at)?,
            })
        })
        .collect()
}

pub fn list_pharmacies(conn: &Connection) -> Result<Vec<Pharmacy>, DatabaseError> {
    list_directory_rows(conn, DirectoryKind::Pharmacy)?
        .into_iter()
        .map(|(id, name, address, created_at)| {
            Ok(Pharmacy {
                id,
                name,
                address,
                created_at: parse_timestamp("created_at", &created_at)?,
            })
        })
        .collect()
}

pub fn directory_record_exists(
    conn: &Connection,
    kind: DirectoryKind,
    id: i64,
) -> Result<bool, DatabaseError> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = ?1)", kind.table());
    let exists = conn.query_row(&sql, params![id], |row| row.get::<_, bool>(0))?;
    Ok(exists)
}

pub fn directory_display_name(
    conn: &Connection,
    kind: DirectoryKind,
    id: i64,
) -> Result<Option<String>, DatabaseError> {
    let sql = format!("SELECT name FROM {} WHERE id = ?1", kind.table());
    let name = conn
        .query_row(&sql, params![id], |row| row.get::<_, String>(0))
        .optional()?;
    Ok(name)
}
