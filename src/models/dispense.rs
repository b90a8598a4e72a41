use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A pharmacy's fulfilment of exactly one prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispense {
    pub id: i64,
    pub prescription_id: i64,
    pub pharmacy_id: i64,
    pub pharmacist_name: String,
    pub amount: Decimal,
    pub notes: String,
    pub dispensed_at: DateTime<Utc>,
}

/// Arguments for dispensing a prescription.
#[derive(Debug, Clone, Deserialize)]
pub struct DispenseRequest {
    pub prescription_id: i64,
    pub pharmacy_id: i64,
    pub pharmacist_name: String,
    pub amount: Decimal,
    pub notes: String,
}
