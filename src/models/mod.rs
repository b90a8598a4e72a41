pub mod directory;
pub mod dispense;
pub mod enums;
pub mod otp;
pub mod prescription;

pub use directory::*;
pub use dispense::*;
pub use otp::*;
pub use prescription::*;
