//! Shared service handle for concurrent callers.
//!
//! `Ledger` is the one value the orchestration layer holds. It keeps the
//! database path, the directory collaborator and the OTP settings, and
//! opens a fresh connection per operation, so it is `Send + Sync` and
//! can be shared through an `Arc`. Serialization of dispense and OTP
//! writes is left to SQLite's write lock (IMMEDIATE transactions).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::db::{self, DatabaseError};
use crate::directory::Directory;
use crate::models::{Dispense, DispenseRequest, NewPrescription, Prescription};
use crate::otp::{self, OtpError, OtpSettings};
use crate::prescriptions::{self, PrescriptionError};

// ═══════════════════════════════════════════════════════════
// Ledger, shared by every caller
// ═══════════════════════════════════════════════════════════

pub struct Ledger {
    db_path: PathBuf,
    directory: Arc<dyn Directory>,
    otp_settings: OtpSettings,
}

impl Ledger {
    /// Migrate the database at `db_path` and build the handle.
    pub fn open(
        db_path: impl Into<PathBuf>,
        directory: Arc<dyn Directory>,
        otp_settings: OtpSettings,
    ) -> Result<Self, DatabaseError> {
        let db_path = db_path.into();
        db::open_database(&db_path)?;
        tracing::info!(path = %db_path.display(), "Ledger opened");
        Ok(Self {
            db_path,
            directory,
            otp_settings,
        })
    }

    /// Open a connection for a single operation.
    pub fn open_db(&self) -> Result<Connection, DatabaseError> {
        db::connect(&self.db_path)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    pub fn otp_settings(&self) -> &OtpSettings {
        &self.otp_settings
    }

    // ── Prescription lifecycle ──────────────────────────────

    pub fn issue_prescription(&self, input: &NewPrescription) -> Result<Prescription, PrescriptionError> {
        let conn = self.open_db()?;
        prescriptions::issue_prescription(&conn, self.directory(), input)
    }

    pub fn dispense_prescription(&self, request: &DispenseRequest) -> Result<Dispense, PrescriptionError> {
        let mut conn = self.open_db()?;
        prescriptions::dispense_prescription(&mut conn, self.directory(), request)
    }

    pub fn list_available_prescriptions(&self) -> Result<Vec<Prescription>, PrescriptionError> {
        prescriptions::list_available_prescriptions(&self.open_db()?)
    }

    pub fn get_dispense_history(&self, pharmacy_id: i64) -> Result<Vec<Dispense>, PrescriptionError> {
        prescriptions::get_dispense_history(&self.open_db()?, pharmacy_id)
    }

    pub fn get_doctor_prescriptions(&self, doctor_id: i64) -> Result<Vec<Prescription>, PrescriptionError> {
        prescriptions::get_doctor_prescriptions(&self.open_db()?, doctor_id)
    }

    pub fn get_patient_prescriptions(&self, patient_id: i64) -> Result<Vec<Prescription>, PrescriptionError> {
        prescriptions::get_patient_prescriptions(&self.open_db()?, patient_id)
    }

    pub fn get_prescription(&self, id: i64) -> Result<Prescription, PrescriptionError> {
        prescriptions::get_prescription(&self.open_db()?, id)
    }

    pub fn get_dispense_for_prescription(
        &self,
        prescription_id: i64,
    ) -> Result<Option<Dispense>, PrescriptionError> {
        prescriptions::get_dispense_for_prescription(&self.open_db()?, prescription_id)
    }

    pub fn pharmacy_billing_total(&self, pharmacy_id: i64) -> Result<Decimal, PrescriptionError> {
        prescriptions::pharmacy_billing_total(&self.open_db()?, pharmacy_id)
    }

    // ── One-time codes ──────────────────────────────────────

    pub fn generate_code(&self, phone: &str) -> Result<String, OtpError> {
        otp::generate_code(&self.open_db()?, &self.otp_settings, phone)
    }

    pub fn verify_code(&self, phone: &str, code: &str) -> Result<bool, OtpError> {
        let mut conn = self.open_db()?;
        otp::verify_code(&mut conn, phone, code)
    }

    pub fn purge_dead_codes(&self) -> Result<usize, OtpError> {
        otp::purge_dead_codes(&self.open_db()?, chrono::Utc::now())
    }
}

// ═══════════════════════════════════════════════════════════
// Error type for the orchestration layer
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Prescription(#[from] PrescriptionError),
    #[error(transparent)]
    Otp(#[from] OtpError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Render error: {0}")]
    Render(#[from] serde_json::Error),
}
