//! Directory services: doctors, patients and pharmacies.
//!
//! The core only asks two things of the directory: does an id exist, and
//! what is its display name. `SqliteDirectory` is the plain keyed-record
//! store behind that contract. A file-backed directory opens a connection
//! per call, so lookups are plain concurrent reads and never queue behind
//! a directory writer or the dispense/OTP write lock.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;

use crate::db::{self, DatabaseError};
use crate::models::enums::DirectoryKind;
use crate::models::{Doctor, Patient, Pharmacy};

/// Existence checks and display data consumed by the core.
pub trait Directory: Send + Sync {
    fn exists(&self, kind: DirectoryKind, id: i64) -> Result<bool, DatabaseError>;
    fn display_name(&self, kind: DirectoryKind, id: i64) -> Result<Option<String>, DatabaseError>;

    fn patient_exists(&self, id: i64) -> Result<bool, DatabaseError> {
        self.exists(DirectoryKind::Patient, id)
    }

    fn doctor_exists(&self, id: i64) -> Result<bool, DatabaseError> {
        self.exists(DirectoryKind::Doctor, id)
    }

    fn pharmacy_exists(&self, id: i64) -> Result<bool, DatabaseError> {
        self.exists(DirectoryKind::Pharmacy, id)
    }

    fn patient_display_name(&self, id: i64) -> Result<Option<String>, DatabaseError> {
        self.display_name(DirectoryKind::Patient, id)
    }

    fn doctor_display_name(&self, id: i64) -> Result<Option<String>, DatabaseError> {
        self.display_name(DirectoryKind::Doctor, id)
    }

    fn pharmacy_display_name(&self, id: i64) -> Result<Option<String>, DatabaseError> {
        self.display_name(DirectoryKind::Pharmacy, id)
    }
}

/// SQLite-backed directory with store-and-list operations.
pub struct SqliteDirectory {
    store: Store,
}

enum Store {
    File(PathBuf),
    // An in-memory database lives and dies with its one connection.
    Memory(Mutex<Connection>),
}

/// Connection borrowed for a single directory call.
enum DirConn<'a> {
    Owned(Connection),
    Shared(MutexGuard<'a, Connection>),
}

impl Deref for DirConn<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Self::Owned(conn) => conn,
            Self::Shared(guard) => &**guard,
        }
    }
}

impl SqliteDirectory {
    /// Open the directory tables in a database file, migrating if needed.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        db::open_database(path)?;
        Ok(Self {
            store: Store::File(path.to_path_buf()),
        })
    }

    /// Standalone in-memory directory (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            store: Store::Memory(Mutex::new(db::open_memory_database()?)),
        })
    }

    fn conn(&self) -> Result<DirConn<'_>, DatabaseError> {
        match &self.store {
            Store::File(path) => Ok(DirConn::Owned(db::connect(path)?)),
            Store::Memory(conn) => conn
                .lock()
                .map(DirConn::Shared)
                .map_err(|_| DatabaseError::LockPoisoned),
        }
    }

    pub fn add_doctor(&self, name: &str, specialty: Option<&str>) -> Result<Doctor, DatabaseError> {
        let name = require_name(DirectoryKind::Doctor, name)?;
        let doctor = db::insert_doctor(&*self.conn()?, name, specialty, Utc::now())?;
        tracing::info!(doctor_id = doctor.id, "Doctor added");
        Ok(doctor)
    }

    pub fn add_patient(&self, name: &str, phone: Option<&str>) -> Result<Patient, DatabaseError> {
        let name = require_name(DirectoryKind::Patient, name)?;
        let patient = db::insert_patient(&*self.conn()?, name, phone, Utc::now())?;
        tracing::info!(patient_id = patient.id, "Patient added");
        Ok(patient)
    }

    pub fn add_pharmacy(&self, name: &str, address: Option<&str>) -> Result<Pharmacy, DatabaseError> {
        let name = require_name(DirectoryKind::Pharmacy, name)?;
        let pharmacy = db::insert_pharmacy(&*self.conn()?, name, address, Utc::now())?;
        tracing::info!(pharmacy_id = pharmacy.id, "Pharmacy added");
        Ok(pharmacy)
    }

    pub fn list_doctors(&self) -> Result<Vec<Doctor>, DatabaseError> {
        db::list_doctors(&*self.conn()?)
    }

    pub fn list_patients(&self) -> Result<Vec<Patient>, DatabaseError> {
        db::list_patients(&*self.conn()?)
    }

    pub fn list_pharmacies(&self) -> Result<Vec<Pharmacy>, DatabaseError> {
        db::list_pharmacies(&*self.conn()?)
    }
}

impl Directory for SqliteDirectory {
    fn exists(&self, kind: DirectoryKind, id: i64) -> Result<bool, DatabaseError> {
        db::directory_record_exists(&*self.conn()?, kind, id)
    }

    fn display_name(&self, kind: DirectoryKind, id: i64) -> Result<Option<String>, DatabaseError> {
        db::directory_display_name(&*self.conn()?, kind, id)
    }
}

fn require_name(kind: DirectoryKind, name: &str) -> Result<&str, DatabaseError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DatabaseError::ConstraintViolation(format!(
            "{kind} name must not be empty"
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_records_exist() {
        let dir = SqliteDirectory::open_in_memory().unwrap();
        let doctor = dir.add_doctor("Dr. Perera", Some("General")).unwrap();
        let patient = dir.add_patient("Nimal Fernando", Some("0771234567")).unwrap();
        let pharmacy = dir.add_pharmacy("City Pharmacy", None).unwrap();

        assert!(dir.doctor_exists(doctor.id).unwrap());
        assert!(dir.patient_exists(patient.id).unwrap());
        assert!(dir.pharmacy_exists(pharmacy.id).unwrap());
        assert!(!dir.pharmacy_exists(pharmacy.id + 100).unwrap());
    }

    #[test]
    fn display_names_resolve_per_kind() {
        let dir = SqliteDirectory::open_in_memory().unwrap();
        let doctor = dir.add_doctor("Dr. Perera", None).unwrap();
        let patient = dir.add_patient("Nimal Fernando", None).unwrap();

        assert_eq!(
            dir.doctor_display_name(doctor.id).unwrap().as_deref(),
            Some("Dr. Perera")
        );
        assert_eq!(
            dir.patient_display_name(patient.id).unwrap().as_deref(),
            Some("Nimal Fernando")
        );
        assert!(dir.pharmacy_display_name(1).unwrap().is_none());
    }

    #[test]
    fn blank_name_rejected() {
        let dir = SqliteDirectory::open_in_memory().unwrap();
        let err = dir.add_pharmacy("   ", None).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
        assert!(dir.list_pharmacies().unwrap().is_empty());
    }

    #[test]
    fn names_are_trimmed() {
        let dir = SqliteDirectory::open_in_memory().unwrap();
        dir.add_patient("  Kamala  ", None).unwrap();
        assert_eq!(dir.list_patients().unwrap()[0].name, "Kamala");
    }

    #[test]
    fn lookup_not_blocked_by_pending_writer() {
        use std::sync::Arc;
        use std::time::{Duration, Instant};

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("directory.db");
        let dir = Arc::new(SqliteDirectory::open(&path).unwrap());
        let pharmacy = dir.add_pharmacy("City Pharmacy", None).unwrap();

        // Another process holds the write lock, e.g. a dispense in flight.
        let holder = db::connect(&path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();

        let writer = {
            let dir = Arc::clone(&dir);
            std::thread::spawn(move || dir.add_doctor("Dr. Silva", None))
        };
        std::thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        assert!(dir.pharmacy_exists(pharmacy.id).unwrap());
        assert!(started.elapsed() < Duration::from_secs(1));

        holder.execute_batch("COMMIT").unwrap();
        writer.join().unwrap().unwrap();
        assert_eq!(dir.list_doctors().unwrap().len(), 1);
    }

    #[test]
    fn list_doctors_returns_all() {
        let dir = SqliteDirectory::open_in_memory().unwrap();
        dir.add_doctor("Dr. Perera", None).unwrap();
        dir.add_doctor("Dr. Silva", Some("Paediatrics")).unwrap();
        assert_eq!(dir.list_doctors().unwrap().len(), 2);
    }
}
