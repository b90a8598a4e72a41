use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{format_timestamp, parse_timestamp, DatabaseError};
use crate::models::*;

/// Store `record` as the only code for its phone number, discarding any
/// previous one in the same statement.
pub fn replace_otp(conn: &Connection, record: &OtpRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO otp_codes (phone_number, code_hash, created_at, expires_at, consumed)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.phone_number,
            &record.code_hash[..],
            format_timestamp(&record.created_at),
            format_timestamp(&record.expires_at),
            record.consumed as i32,
        ],
    )?;
    Ok(())
}

pub fn get_otp(conn: &Connection, phone_number: &str) -> Result<Option<OtpRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT phone_number, code_hash, created_at, expires_at, consumed
             FROM otp_codes WHERE phone_number = ?1",
            params![phone_number],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((phone_number, hash, created_at, expires_at, consumed)) = row else {
        return Ok(None);
    };
    let code_hash: [u8; 32] = hash.try_into().map_err(|_| DatabaseError::InvalidValue {
        field: "code_hash".into(),
        value: phone_number.clone(),
    })?;

    Ok(Some(OtpRecord {
        code_hash,
        created_at: parse_timestamp("created_at", &created_at)?,
        expires_at: parse_timestamp("expires_at", &expires_at)?,
        consumed,
        phone_number,
    }))
}

/// Flip the consumed flag if it is still clear. Returns whether this call
/// did the flip.
pub fn mark_otp_consumed(conn: &Connection, phone_number: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE otp_codes SET consumed = 1 WHERE phone_number = ?1 AND consumed = 0",
        params![phone_number],
    )?;
    Ok(changed == 1)
}

/// Delete consumed or expired codes. Active codes are left alone.
pub fn delete_dead_otps(conn: &Connection, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM otp_codes WHERE consumed = 1 OR expires_at <= ?1",
        params![format_timestamp(&now)],
    )?;
    Ok(deleted)
}
