//! Console walkthrough of the prescription lifecycle and the one-time
//! code flow. Seeds a small directory on first run.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::directory::SqliteDirectory;
use crate::ledger::{Ledger, LedgerError};
use crate::models::{DispenseRequest, NewPrescription};
use crate::prescriptions::PrescriptionError;

/// Ids of the directory records the walkthrough uses.
#[derive(Debug, Clone, Copy)]
pub struct DemoCast {
    pub patient_id: i64,
    pub doctor_id: i64,
    pub pharmacy_id: i64,
}

/// Reuse existing directory records, or add a starter set when empty.
pub fn seed_directory(directory: &SqliteDirectory) -> Result<DemoCast, LedgerError> {
    let patient_id = match directory.list_patients()?.first() {
        Some(p) => p.id,
        None => directory.add_patient("Nimal Fernando", Some("0771234567"))?.id,
    };
    let doctor_id = match directory.list_doctors()?.first() {
        Some(d) => d.id,
        None => directory.add_doctor("Dr. Anura Perera", Some("General Practice"))?.id,
    };
    let pharmacy_id = match directory.list_pharmacies()?.first() {
        Some(p) => p.id,
        None => directory.add_pharmacy("City Pharmacy", Some("12 Main Street"))?.id,
    };
    Ok(DemoCast {
        patient_id,
        doctor_id,
        pharmacy_id,
    })
}

pub fn run_demo(ledger: &Ledger, cast: DemoCast) -> Result<(), LedgerError> {
    let directory = ledger.directory();
    let name_or_id = |name: Option<String>, id: i64| name.unwrap_or_else(|| format!("#{id}"));

    // Issue
    let rx = ledger.issue_prescription(&NewPrescription {
        patient_id: cast.patient_id,
        doctor_id: cast.doctor_id,
        medication: "Amoxicillin 500mg".into(),
        instructions: "One capsule three times daily for 7 days".into(),
    })?;
    println!(
        "Issued prescription #{} for {} by {}: {}",
        rx.id,
        name_or_id(directory.patient_display_name(rx.patient_id)?, rx.patient_id),
        name_or_id(directory.doctor_display_name(rx.doctor_id)?, rx.doctor_id),
        rx.medication
    );

    let available = ledger.list_available_prescriptions()?;
    println!("Available prescriptions: {}", available.len());
    for p in &available {
        println!("  #{} {} (issued {})", p.id, p.medication, p.issued_at.format("%Y-%m-%d %H:%M"));
    }

    // Dispense, then try again
    let request = DispenseRequest {
        prescription_id: rx.id,
        pharmacy_id: cast.pharmacy_id,
        pharmacist_name: "Jane".into(),
        amount: Decimal::new(2550, 2),
        notes: "Counselled on completing the course".into(),
    };
    let dispense = ledger.dispense_prescription(&request)?;
    println!("Dispensed:\n{}", serde_json::to_string_pretty(&dispense)?);

    match ledger.dispense_prescription(&request) {
        Err(PrescriptionError::AlreadyDispensed { prescription_id }) => {
            println!("Prescription #{prescription_id} was already dispensed; second dispense refused");
        }
        Err(e) => return Err(e.into()),
        Ok(d) => println!("Unexpected second dispense #{}", d.id),
    }

    // History
    let pharmacy_name = name_or_id(directory.pharmacy_display_name(cast.pharmacy_id)?, cast.pharmacy_id);
    println!("Dispense history for {pharmacy_name}:");
    for d in ledger.get_dispense_history(cast.pharmacy_id)? {
        println!(
            "  {} rx #{} by {}: {}",
            d.dispensed_at.format("%Y-%m-%d %H:%M"),
            d.prescription_id,
            d.pharmacist_name,
            d.amount
        );
    }
    println!(
        "Total billed by {pharmacy_name}: {}",
        ledger.pharmacy_billing_total(cast.pharmacy_id)?
    );
    println!(
        "Prescriptions written by {}: {}",
        name_or_id(directory.doctor_display_name(cast.doctor_id)?, cast.doctor_id),
        ledger.get_doctor_prescriptions(cast.doctor_id)?.len()
    );

    // One-time code
    let phone = "0771234567";
    let code = ledger.generate_code(phone)?;
    let minutes = ledger.otp_settings().ttl.num_minutes();
    println!("Sent code {code} to {phone} (valid {minutes} min)");
    println!("Verify {code}: {}", ledger.verify_code(phone, &code)?);
    println!("Verify {code} again: {}", ledger.verify_code(phone, &code)?);

    let purged = ledger.purge_dead_codes()?;
    println!("Purged {purged} used or expired code(s)");
    Ok(())
}

/// Open the ledger at `path` with a SQLite directory in the same file.
pub fn open_local(path: &std::path::Path) -> Result<(Ledger, Arc<SqliteDirectory>), LedgerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let directory = Arc::new(SqliteDirectory::open(path)?);
    let ledger = Ledger::open(path, directory.clone(), Default::default())?;
    Ok((ledger, directory))
}
