//! One-time verification codes keyed by phone number.
//!
//! Per phone number: NoCode → Active → {Consumed, Expired}. Each phone has
//! one stored record; generating a new code replaces it, so only the
//! newest code can ever verify. Codes are kept only as a SHA-256 hash
//! bound to the phone number. Expiry is evaluated lazily at verification.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use rusqlite::{Connection, TransactionBehavior};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config;
use crate::db::{self, DatabaseError};
use crate::models::enums::OtpState;
use crate::models::OtpRecord;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

/// Code shape and lifetime.
#[derive(Debug, Clone, Copy)]
pub struct OtpSettings {
    pub code_length: u32,
    pub ttl: Duration,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            code_length: config::OTP_CODE_LENGTH,
            ttl: Duration::seconds(config::OTP_TTL_SECS),
        }
    }
}

/// Accepted code lengths. Upper bound keeps `10^len` well inside u64.
const CODE_LENGTH_RANGE: std::ops::RangeInclusive<u32> = 4..=10;

// ═══════════════════════════════════════════════════════════
// Generate
// ═══════════════════════════════════════════════════════════

/// Generate a fresh code for `phone`, replacing any previous one.
pub fn generate_code(
    conn: &Connection,
    settings: &OtpSettings,
    phone: &str,
) -> Result<String, OtpError> {
    generate_code_at(conn, settings, phone, Utc::now())
}

pub fn generate_code_at(
    conn: &Connection,
    settings: &OtpSettings,
    phone: &str,
    now: DateTime<Utc>,
) -> Result<String, OtpError> {
    let phone = normalize_phone(phone)?;
    if !CODE_LENGTH_RANGE.contains(&settings.code_length) {
        return Err(OtpError::Validation(format!(
            "code length {} outside {:?}",
            settings.code_length, CODE_LENGTH_RANGE
        )));
    }
    if settings.ttl <= Duration::zero() {
        return Err(OtpError::Validation("code lifetime must be positive".into()));
    }

    let code = random_numeric_code(settings.code_length);
    let record = OtpRecord {
        code_hash: hash_code(&phone, &code),
        created_at: now,
        expires_at: now + settings.ttl,
        consumed: false,
        phone_number: phone,
    };
    // Single INSERT OR REPLACE: the last completed write is the live code.
    db::replace_otp(conn, &record)?;

    tracing::info!(
        phone = %mask_phone(&record.phone_number),
        expires_at = %record.expires_at,
        "OTP generated"
    );
    Ok(code)
}

// ═══════════════════════════════════════════════════════════
// Verify
// ═══════════════════════════════════════════════════════════

/// Verify and consume a code. `Ok(false)` for every rejection; only
/// storage failures are errors.
pub fn verify_code(conn: &mut Connection, phone: &str, code: &str) -> Result<bool, OtpError> {
    verify_code_at(conn, phone, code, Utc::now())
}

pub fn verify_code_at(
    conn: &mut Connection,
    phone: &str,
    code: &str,
    now: DateTime<Utc>,
) -> Result<bool, OtpError> {
    let Ok(phone) = normalize_phone(phone) else {
        tracing::debug!(reason = "malformed_phone", "OTP rejected");
        return Ok(false);
    };

    // Read, compare and consume under one write lock, so a concurrent
    // generate cannot swap the record between comparison and consume.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(DatabaseError::from)?;

    let Some(record) = db::get_otp(&tx, &phone)? else {
        tracing::debug!(phone = %mask_phone(&phone), reason = "missing", "OTP rejected");
        return Ok(false);
    };

    let state = record.state_at(now);
    if state != OtpState::Active {
        tracing::debug!(phone = %mask_phone(&phone), reason = state.as_str(), "OTP rejected");
        return Ok(false);
    }

    let supplied = hash_code(&phone, code);
    if supplied[..].ct_eq(&record.code_hash[..]).unwrap_u8() == 0 {
        tracing::debug!(phone = %mask_phone(&phone), reason = "mismatch", "OTP rejected");
        return Ok(false);
    }

    let consumed = db::mark_otp_consumed(&tx, &phone)?;
    tx.commit().map_err(DatabaseError::from)?;

    if consumed {
        tracing::info!(phone = %mask_phone(&phone), "OTP verified");
    }
    Ok(consumed)
}

/// Drop consumed and expired records. Active codes are untouched.
pub fn purge_dead_codes(conn: &Connection, now: DateTime<Utc>) -> Result<usize, OtpError> {
    let purged = db::delete_dead_otps(conn, now)?;
    if purged > 0 {
        tracing::info!(purged, "Purged dead OTP records");
    }
    Ok(purged)
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

/// Canonical phone key: separators stripped, optional leading `+`,
/// 7 to 15 digits.
pub fn normalize_phone(raw: &str) -> Result<String, OtpError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OtpError::Validation("phone number must not be empty".into()));
    }

    let (prefix, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(OtpError::Validation(format!(
                    "phone number contains invalid character {c:?}"
                )))
            }
        }
    }

    if !(7..=15).contains(&digits.len()) {
        return Err(OtpError::Validation(format!(
            "phone number must have 7 to 15 digits, got {}",
            digits.len()
        )));
    }
    Ok(format!("{prefix}{digits}"))
}

/// Uniform zero-padded numeric code from the OS CSPRNG.
fn random_numeric_code(length: u32) -> String {
    let upper = 10u64.pow(length);
    let value = OsRng.gen_range(0..upper);
    format!("{value:0width$}", width = length as usize)
}

fn hash_code(phone: &str, code: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(phone.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hasher.finalize().into()
}

/// Phone number with all but the last three digits hidden, for logs.
fn mask_phone(phone: &str) -> String {
    let visible = phone.len().saturating_sub(3);
    format!("{}{}", "*".repeat(visible), &phone[visible..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::TimeZone;

    const PHONE: &str = "0771234567";

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    // ── Generation ────────────────────────────────────────

    #[test]
    fn generated_code_is_six_digits() {
        let conn = open_memory_database().unwrap();
        let code = generate_code(&conn, &OtpSettings::default(), PHONE).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn random_codes_keep_leading_zeros() {
        for _ in 0..200 {
            let code = random_numeric_code(6);
            assert_eq!(code.len(), 6);
        }
    }

    #[test]
    fn stored_record_holds_hash_not_code() {
        let conn = open_memory_database().unwrap();
        let code = generate_code_at(&conn, &OtpSettings::default(), PHONE, base_time()).unwrap();

        let record = db::get_otp(&conn, PHONE).unwrap().unwrap();
        assert_eq!(record.code_hash, hash_code(PHONE, &code));
        assert_eq!(record.expires_at, base_time() + Duration::minutes(5));
        assert!(!record.consumed);
    }

    #[test]
    fn empty_phone_rejected_on_generate() {
        let conn = open_memory_database().unwrap();
        let err = generate_code(&conn, &OtpSettings::default(), "  ").unwrap_err();
        assert!(matches!(err, OtpError::Validation(_)));
    }

    #[test]
    fn bad_settings_rejected() {
        let conn = open_memory_database().unwrap();
        let short = OtpSettings {
            code_length: 2,
            ..OtpSettings::default()
        };
        assert!(matches!(
            generate_code(&conn, &short, PHONE),
            Err(OtpError::Validation(_))
        ));

        let no_ttl = OtpSettings {
            ttl: Duration::zero(),
            ..OtpSettings::default()
        };
        assert!(matches!(
            generate_code(&conn, &no_ttl, PHONE),
            Err(OtpError::Validation(_))
        ));
    }

    // ── Verification ──────────────────────────────────────

    #[test]
    fn correct_code_verifies_exactly_once() {
        let mut conn = open_memory_database().unwrap();
        let code = generate_code(&conn, &OtpSettings::default(), PHONE).unwrap();

        assert!(verify_code(&mut conn, PHONE, &code).unwrap());
        assert!(!verify_code(&mut conn, PHONE, &code).unwrap());
        assert!(!verify_code(&mut conn, PHONE, &code).unwrap());
    }

    #[test]
    fn regenerating_invalidates_previous_code() {
        let mut conn = open_memory_database().unwrap();
        let settings = OtpSettings::default();
        let first = generate_code(&conn, &settings, PHONE).unwrap();
        let mut second = generate_code(&conn, &settings, PHONE).unwrap();
        while second == first {
            second = generate_code(&conn, &settings, PHONE).unwrap();
        }

        assert!(!verify_code(&mut conn, PHONE, &first).unwrap());
        assert!(verify_code(&mut conn, PHONE, &second).unwrap());
    }

    #[test]
    fn padded_code_does_not_match() {
        let mut conn = open_memory_database().unwrap();
        let code = generate_code(&conn, &OtpSettings::default(), PHONE).unwrap();

        assert!(!verify_code(&mut conn, PHONE, &format!(" {code}")).unwrap());
        assert!(!verify_code(&mut conn, PHONE, &format!("{code}\n")).unwrap());
        assert!(!verify_code(&mut conn, PHONE, &format!("  {code}\t\n")).unwrap());

        let record = db::get_otp(&conn, PHONE).unwrap().unwrap();
        assert!(!record.consumed);
        assert!(verify_code(&mut conn, PHONE, &code).unwrap());
    }

    #[test]
    fn later_generation_wins_regardless_of_timestamp() {
        let mut conn = open_memory_database().unwrap();
        let settings = OtpSettings::default();
        let late = generate_code_at(&conn, &settings, PHONE, base_time() + Duration::seconds(30)).unwrap();
        let mut early = generate_code_at(&conn, &settings, PHONE, base_time()).unwrap();
        while early == late {
            early = generate_code_at(&conn, &settings, PHONE, base_time()).unwrap();
        }

        let now = base_time() + Duration::seconds(60);
        assert!(!verify_code_at(&mut conn, PHONE, &late, now).unwrap());
        assert!(verify_code_at(&mut conn, PHONE, &early, now).unwrap());
    }

    #[test]
    fn storage_failure_surfaces_as_error() {
        let mut conn = open_memory_database().unwrap();
        conn.execute_batch("DROP TABLE otp_codes").unwrap();

        let err = generate_code(&conn, &OtpSettings::default(), PHONE).unwrap_err();
        assert!(matches!(err, OtpError::Storage(DatabaseError::Sqlite(_))));
        let err = verify_code(&mut conn, PHONE, "123456").unwrap_err();
        assert!(matches!(err, OtpError::Storage(_)));
        assert!(matches!(purge_dead_codes(&conn, base_time()), Err(OtpError::Storage(_))));
    }

    #[test]
    fn expired_code_is_rejected() {
        let mut conn = open_memory_database().unwrap();
        let code = generate_code_at(&conn, &OtpSettings::default(), PHONE, base_time()).unwrap();

        let at_deadline = base_time() + Duration::minutes(5);
        assert!(!verify_code_at(&mut conn, PHONE, &code, at_deadline).unwrap());

        let just_before = at_deadline - Duration::seconds(1);
        assert!(verify_code_at(&mut conn, PHONE, &code, just_before).unwrap());
    }

    #[test]
    fn wrong_code_does_not_consume() {
        let mut conn = open_memory_database().unwrap();
        let code = generate_code(&conn, &OtpSettings::default(), PHONE).unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        assert!(!verify_code(&mut conn, PHONE, wrong).unwrap());
        assert!(verify_code(&mut conn, PHONE, &code).unwrap());
    }

    #[test]
    fn unknown_or_malformed_phone_is_false() {
        let mut conn = open_memory_database().unwrap();
        let code = generate_code(&conn, &OtpSettings::default(), PHONE).unwrap();

        assert!(!verify_code(&mut conn, "0779999999", &code).unwrap());
        assert!(!verify_code(&mut conn, "", &code).unwrap());
        assert!(!verify_code(&mut conn, "not-a-phone", &code).unwrap());
    }

    #[test]
    fn formatting_differences_map_to_same_phone() {
        let mut conn = open_memory_database().unwrap();
        let code = generate_code(&conn, &OtpSettings::default(), "077-123 4567").unwrap();
        assert!(verify_code(&mut conn, "(077) 123.4567", &code).unwrap());
    }

    #[test]
    fn purge_removes_only_dead_records() {
        let mut conn = open_memory_database().unwrap();
        let settings = OtpSettings::default();
        let used = generate_code_at(&conn, &settings, "0771111111", base_time()).unwrap();
        verify_code_at(&mut conn, "0771111111", &used, base_time()).unwrap();
        generate_code_at(&conn, &settings, "0772222222", base_time() - Duration::hours(1)).unwrap();
        generate_code_at(&conn, &settings, "0773333333", base_time()).unwrap();

        assert_eq!(purge_dead_codes(&conn, base_time()).unwrap(), 2);
        assert!(db::get_otp(&conn, "0773333333").unwrap().is_some());
    }

    // ── Helpers ───────────────────────────────────────────

    #[test]
    fn normalize_phone_accepts_common_formats() {
        assert_eq!(normalize_phone("0771234567").unwrap(), "0771234567");
        assert_eq!(normalize_phone(" +94 77 123 4567 ").unwrap(), "+94771234567");
        assert_eq!(normalize_phone("(077) 123-4567").unwrap(), "0771234567");
    }

    #[test]
    fn normalize_phone_rejects_garbage() {
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("1234567890123456").is_err());
        assert!(normalize_phone("077123456a").is_err());
        assert!(normalize_phone("++94771234567").is_err());
    }

    #[test]
    fn hash_binds_code_to_phone() {
        assert_ne!(hash_code("0771111111", "123456"), hash_code("0772222222", "123456"));
        assert_eq!(hash_code(PHONE, "123456"), hash_code(PHONE, "123456"));
    }

    #[test]
    fn mask_hides_all_but_last_three() {
        assert_eq!(mask_phone("0771234567"), "*******567");
        assert_eq!(mask_phone("12"), "12");
    }
}
