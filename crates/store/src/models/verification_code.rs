//! Verification code record.

use serde::{Deserialize, Serialize};

use super::Record;

/// Flow a code was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    Register,
    ResetPassword,
}

impl CodeType {
    /// Snake-case wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::ResetPassword => "reset_password",
        }
    }
}

/// An issued code. Only the keyed hash of the code is stored.
///
/// `issued -> attempts* -> verified`, or expired/exhausted. A verified
/// record never becomes usable again. `uses` is claimed with an atomic
/// increment; only the caller that moves it to 1 consumes the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    pub id: String,
    pub email: String,
    pub hashed_code: String,
    #[serde(rename = "type")]
    pub code_type: CodeType,
    pub attempts: i64,
    pub created_at: i64,
    pub expires_at: i64,
    pub verified: bool,
    #[serde(default)]
    pub uses: i64,
    #[serde(default)]
    pub verified_at: Option<i64>,
    #[serde(default)]
    pub client_ip: Option<String>,
}

impl Record for VerificationCode {
    const COLLECTION: &'static str = "verification_codes";
}
