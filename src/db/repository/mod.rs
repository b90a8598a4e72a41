//! Repository layer: entity-scoped database operations.
//!
//! Every function takes an explicit connection handle; nothing here
//! enforces business rules beyond what the schema itself guarantees.

mod directory;
mod dispense;
mod otp;
mod prescription;

pub use directory::*;
pub use dispense::*;
pub use otp::*;
pub use prescription::*;
