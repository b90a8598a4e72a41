use chrono::{DateTime, Utc};

use super::enums::OtpState;

/// The single current code for a phone number. Only the hash of the code
/// is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct OtpRecord {
    pub phone_number: String,
    pub code_hash: [u8; 32],
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl OtpRecord {
    /// Lifecycle state at `now`. Consumption is reported ahead of expiry.
    pub fn state_at(&self, now: DateTime<Utc>) -> OtpState {
        if self.consumed {
            OtpState::Consumed
        } else if now >= self.expires_at {
            OtpState::Expired
        } else {
            OtpState::Active
        }
    }
}
